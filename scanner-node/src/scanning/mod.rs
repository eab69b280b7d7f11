pub mod accumulator;
pub mod extractor;
pub mod worker;

pub use accumulator::PackAccumulator;
pub use extractor::{CodeExtractor, DecodedCodes, NullExtractor, ScriptedExtractor};
pub use worker::CameraWorker;
