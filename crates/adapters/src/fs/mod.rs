mod assets;
mod clock;

pub use assets::FsAssetWriter;
pub use clock::SystemClock;
