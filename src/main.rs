//! envscene: a lit interior scene with an HDR environment, a glTF model and a live
//! parameter panel.
//!
//! - Asset loading runs on worker threads; the scene fills in as files arrive
//! - Standard materials follow one global environment intensity
//! - Rendering is wgpu with egui drawn on top

mod app;
mod assets;
mod config;
mod render;
mod scene;
mod ui;

fn main() {
    if let Err(err) = app::run() {
        log::error!("{err}");
        eprintln!("envscene: {err}");
        std::process::exit(1);
    }
}
