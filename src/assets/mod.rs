mod environment;
pub mod model;
mod texture;

pub use environment::{EnvironmentLevel, EnvironmentMap};
pub use model::ImportedModel;
#[cfg(test)]
pub use texture::TextureState;
pub use texture::{ColorSpace, TextureHandle, TextureImage, TextureStore};

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to import glTF {path}: {source}")]
    Gltf {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("glTF mesh '{mesh}' has a primitive without positions")]
    MissingPositions { mesh: String },
    #[error("loader for {path} panicked: {message}")]
    Panicked { path: String, message: String },
    #[error("failed to start loader thread for {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What was asked for. Travels with the outcome so the continuation knows where the result goes.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetRequest {
    Texture { handle: TextureHandle, path: String },
    Environment { path: String },
    Model { path: String },
}

impl AssetRequest {
    pub fn path(&self) -> &str {
        match self {
            AssetRequest::Texture { path, .. }
            | AssetRequest::Environment { path }
            | AssetRequest::Model { path } => path,
        }
    }
}

#[derive(Debug)]
pub enum AssetPayload {
    Texture(TextureImage),
    Environment(EnvironmentMap),
    Model(ImportedModel),
}

#[derive(Debug)]
pub struct AssetOutcome {
    pub request: AssetRequest,
    pub result: Result<AssetPayload, AssetError>,
}

/// Fires every request on its own worker thread and hands completed outcomes back to the
/// thread that polls. Workers only decode; they never see the scene.
pub struct AssetLoader {
    root: PathBuf,
    sender: Sender<AssetOutcome>,
    receiver: Receiver<AssetOutcome>,
    in_flight: usize,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            root: root.into(),
            sender,
            receiver,
            in_flight: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Returns a placeholder handle immediately; the slot is filled when the outcome is applied.
    pub fn load_texture(
        &mut self,
        store: &mut TextureStore,
        path: &str,
        color_space: ColorSpace,
    ) -> TextureHandle {
        let handle = store.reserve(path, color_space);
        self.spawn(
            AssetRequest::Texture {
                handle,
                path: path.to_string(),
            },
            |full_path| {
                let bytes = read_bytes(full_path)?;
                TextureImage::decode(&bytes)
                    .map(AssetPayload::Texture)
                    .map_err(|source| AssetError::Image {
                        path: full_path.display().to_string(),
                        source,
                    })
            },
        );
        handle
    }

    pub fn load_environment(&mut self, path: &str) {
        self.spawn(
            AssetRequest::Environment {
                path: path.to_string(),
            },
            |full_path| {
                let bytes = read_bytes(full_path)?;
                EnvironmentMap::decode_hdr(&bytes)
                    .map(AssetPayload::Environment)
                    .map_err(|source| AssetError::Image {
                        path: full_path.display().to_string(),
                        source,
                    })
            },
        );
    }

    pub fn load_model(&mut self, path: &str) {
        self.spawn(
            AssetRequest::Model {
                path: path.to_string(),
            },
            |full_path| model::import_gltf(full_path).map(AssetPayload::Model),
        );
    }

    /// Drain every outcome that has completed so far without blocking.
    pub fn poll(&mut self) -> Vec<AssetOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(outcome) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    outcomes.push(outcome);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Block until every request issued so far has reported back.
    #[cfg(test)]
    pub fn wait_all(&mut self) -> Vec<AssetOutcome> {
        let mut outcomes = Vec::new();
        while self.in_flight > 0 {
            match self.receiver.recv() {
                Ok(outcome) => {
                    self.in_flight -= 1;
                    outcomes.push(outcome);
                }
                Err(_) => break,
            }
        }
        outcomes
    }

    fn spawn<F>(&mut self, request: AssetRequest, job: F)
    where
        F: FnOnce(&Path) -> Result<AssetPayload, AssetError> + Send + 'static,
    {
        let full_path = self.root.join(request.path());
        let sender = self.sender.clone();
        let thread_request = request.clone();
        log::debug!("Requesting asset {}", full_path.display());
        self.in_flight += 1;

        let spawned = std::thread::Builder::new()
            .name(format!("asset:{}", request.path()))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| job(&full_path)))
                    .unwrap_or_else(|payload| {
                        Err(AssetError::Panicked {
                            path: full_path.display().to_string(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                // The receiver only goes away at shutdown.
                let _ = sender.send(AssetOutcome {
                    request: thread_request,
                    result,
                });
            });

        if let Err(source) = spawned {
            let path = self.root.join(request.path()).display().to_string();
            let _ = self.sender.send(AssetOutcome {
                request,
                result: Err(AssetError::Spawn { path, source }),
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, AssetError> {
    std::fs::read(path).map_err(|source| AssetError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{AssetError, AssetLoader, AssetPayload, AssetRequest, ColorSpace, TextureStore};
    use std::path::PathBuf;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("envscene-assets-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn texture_load_returns_pending_handle_then_reports_outcome() {
        let root = temp_root("png");
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        image.save(root.join("tile.png")).unwrap();

        let mut store = TextureStore::new();
        let mut loader = AssetLoader::new(&root);
        let handle = loader.load_texture(&mut store, "tile.png", ColorSpace::Srgb);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(loader.in_flight(), 1);

        let outcomes = loader.wait_all();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(loader.in_flight(), 0);
        let outcome = &outcomes[0];
        assert_eq!(
            outcome.request,
            AssetRequest::Texture {
                handle,
                path: "tile.png".to_string()
            }
        );
        match &outcome.result {
            Ok(AssetPayload::Texture(texture)) => {
                assert_eq!((texture.width, texture.height), (2, 2));
                assert_eq!(&texture.rgba8[..4], &[10, 20, 30, 255]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_files_fail_without_panicking() {
        let root = temp_root("missing");
        let mut store = TextureStore::new();
        let mut loader = AssetLoader::new(&root);
        loader.load_texture(&mut store, "nope.jpg", ColorSpace::Linear);
        loader.load_environment("nope.hdr");
        loader.load_model("nope.gltf");

        let outcomes = loader.wait_all();
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            match (&outcome.request, &outcome.result) {
                (AssetRequest::Model { .. }, Err(AssetError::Gltf { .. })) => {}
                (_, Err(AssetError::Read { path, .. })) => assert!(path.contains("nope")),
                (request, result) => panic!("unexpected {request:?} -> {result:?}"),
            }
        }

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn panicking_decoder_still_reports_an_outcome() {
        let mut loader = AssetLoader::new("unused");
        let request = AssetRequest::Environment {
            path: "broken.hdr".to_string(),
        };
        loader.spawn(request.clone(), |_| panic!("corrupt header"));

        let outcomes = loader.wait_all();
        assert_eq!(loader.in_flight(), 0);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].request, request);
        match &outcomes[0].result {
            Err(AssetError::Panicked { path, message }) => {
                assert!(path.ends_with("broken.hdr"));
                assert_eq!(message, "corrupt header");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn poll_is_non_blocking_when_idle() {
        let mut loader = AssetLoader::new("unused");
        assert!(loader.poll().is_empty());
        assert_eq!(loader.in_flight(), 0);
    }
}
