mod rotation;

pub use rotation::{ChunkCompletion, EngineState, NextStep, RotationEngine};
