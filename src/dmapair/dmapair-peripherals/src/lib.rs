pub mod console;
pub mod loopback;
#[cfg(feature = "probe-streamer")]
pub mod streamer;
