pub mod backend;
pub mod service;

pub use backend::{
    commands, BackendClient, CommandBackend, CommandResponse, CommandTransport, ContentEncoding,
    MemoryBackend,
};
pub use service::{FileService, LoadedFile, ScanOutcome, ScanSource, UploadRequest};
