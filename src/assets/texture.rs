use std::sync::Arc;

/// Index of a texture slot in a [`TextureStore`]. Handed out before the pixels exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// Decoded 8-bit RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

impl TextureImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba8: rgba.into_raw(),
        })
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba8: rgba.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TextureState {
    Pending,
    Ready(Arc<TextureImage>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TextureSlot {
    pub label: String,
    pub color_space: ColorSpace,
    pub state: TextureState,
}

/// Owner of every texture the scene references. Slots are never removed.
#[derive(Debug, Default)]
pub struct TextureStore {
    slots: Vec<TextureSlot>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Reserve a slot in the `Pending` state; the pixels arrive later through [`Self::fill`].
    pub fn reserve(&mut self, label: impl Into<String>, color_space: ColorSpace) -> TextureHandle {
        self.push(TextureSlot {
            label: label.into(),
            color_space,
            state: TextureState::Pending,
        })
    }

    pub fn insert_ready(
        &mut self,
        label: impl Into<String>,
        image: TextureImage,
        color_space: ColorSpace,
    ) -> TextureHandle {
        self.push(TextureSlot {
            label: label.into(),
            color_space,
            state: TextureState::Ready(Arc::new(image)),
        })
    }

    pub fn fill(&mut self, handle: TextureHandle, image: TextureImage) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            slot.state = TextureState::Ready(Arc::new(image));
        }
    }

    pub fn fail(&mut self, handle: TextureHandle, reason: impl Into<String>) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            slot.state = TextureState::Failed(reason.into());
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&TextureSlot> {
        self.slots.get(handle.index())
    }

    pub fn ready_image(&self, handle: TextureHandle) -> Option<(&Arc<TextureImage>, ColorSpace)> {
        let slot = self.get(handle)?;
        match &slot.state {
            TextureState::Ready(image) => Some((image, slot.color_space)),
            _ => None,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.state, TextureState::Pending))
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, slot: TextureSlot) -> TextureHandle {
        let handle = TextureHandle(self.slots.len() as u32);
        self.slots.push(slot);
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorSpace, TextureImage, TextureState, TextureStore};

    #[test]
    fn reserved_handle_is_pending_until_filled() {
        let mut store = TextureStore::new();
        let handle = store.reserve("floor_diff", ColorSpace::Srgb);
        assert!(matches!(store.get(handle).unwrap().state, TextureState::Pending));
        assert!(store.ready_image(handle).is_none());
        assert_eq!(store.pending_count(), 1);

        store.fill(handle, TextureImage::solid([255, 0, 0, 255]));
        let (image, color_space) = store.ready_image(handle).unwrap();
        assert_eq!(image.rgba8, vec![255, 0, 0, 255]);
        assert_eq!(color_space, ColorSpace::Srgb);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn failed_handle_keeps_reason() {
        let mut store = TextureStore::new();
        let handle = store.reserve("wall_arm", ColorSpace::Linear);
        store.fail(handle, "file not found");
        match &store.get(handle).unwrap().state {
            TextureState::Failed(reason) => assert_eq!(reason, "file not found"),
            other => panic!("unexpected state {other:?}"),
        }
        assert!(store.ready_image(handle).is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(TextureImage::decode(b"not an image").is_err());
    }
}
