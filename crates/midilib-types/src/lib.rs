pub mod descriptor;
pub mod event;
pub mod payload;
pub mod policy;

pub use descriptor::{file_extension, FileDescriptor};
pub use event::{FileEvent, Message};
pub use payload::{MidiEvent, MidiHeader, MidiPayload, MidiTrack};
pub use policy::EvictionPolicy;
