//! Concrete [`crate::WorkerHandler`] implementations, one per pipeline
//! stage named in spec §4.3. `intercept` has no queue contract or message
//! schema anywhere else in the specification and is left unimplemented
//! (see DESIGN.md).

mod finalize;
mod ingest;
mod mapper;
mod release;
mod verify;

pub use finalize::FinalizeHandler;
pub use ingest::IngestHandler;
pub use mapper::MapperHandler;
pub use release::ReleaseHandler;
pub use verify::VerifyHandler;
