pub mod event;

pub use event::{EventData, EventRecord};
