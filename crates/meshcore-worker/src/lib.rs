//! MeshCore async worker.
//!
//! The main tick loop must never block: file reads, map-tile decodes, and
//! bulk crypto all run on the single worker thread this crate owns. The
//! contract is a pair of bounded queues: submit a [`Request`], get back
//! exactly one [`WorkerResult`] carrying the same [`Token`], with
//! back-pressure instead of blocking when the worker falls behind.
//!
//! Buffer ownership is strictly linear: input buffers move into the
//! request, output buffers arrive owned by the result. The two threads
//! share nothing else.

pub mod request;
pub mod rle;
pub mod worker;

pub use request::{
    MAX_FILE_SIZE, MAX_INLINE_KEY, MAX_JSON_SIZE, MAX_PATH_LEN, Output, Request, Token,
    WorkerError, WorkerResult,
};
pub use rle::{RLE_DECODE_BUDGET, TILE_3BIT_SIZE, TILE_RGB565_SIZE};
pub use worker::{QUEUE_DEPTH, SubmitError, Worker, WorkerConfig};
