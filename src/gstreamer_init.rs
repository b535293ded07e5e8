//! GStreamer initialization
//!
//! Buffers and clocks need an initialized GStreamer. Initialization runs once
//! per process; later callers get the cached outcome.

use std::sync::OnceLock;

use gstreamer as gst;

static GSTREAMER_INIT: OnceLock<Result<(), gst::glib::Error>> = OnceLock::new();

/// Initialize GStreamer, logging the outcome the first time
pub fn init_gstreamer_env() {
    let _ = ensure_initialized();
}

/// Initialize GStreamer if that hasn't happened yet
pub fn ensure_initialized() -> Result<(), gst::glib::Error> {
    GSTREAMER_INIT
        .get_or_init(|| match gst::init() {
            Ok(()) => {
                log::info!("GStreamer initialized successfully");
                log_gstreamer_version();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to initialize GStreamer: {}", e);
                log::error!("Buffer creation will not be available");
                Err(e)
            }
        })
        .clone()
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gst::version();
    log::info!("GStreamer version: {}.{}.{}.{}", major, minor, micro, nano);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        ensure_initialized().unwrap();
        ensure_initialized().unwrap();
        init_gstreamer_env();
    }
}
