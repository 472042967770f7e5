//! The worker thread and its handle.
//!
//! One long-lived OS thread owns all blocking I/O and heavy compute. The
//! main tick loop talks to it through two bounded channels (capacity 8
//! each way): [`Worker::submit`] refuses with `Backpressured` when the
//! request queue is full, and [`Worker::poll_result`] drains finished
//! results without blocking. Requests from the single submitter are
//! processed and answered strictly in order.
//!
//! A continuation that dies before its result lands calls
//! [`Worker::retire`]; the orphaned result is dropped (buffer and all) at
//! the next poll instead of being delivered.

use std::{
    collections::HashSet,
    fs,
    io::{Read as _, Seek as _, SeekFrom, Write as _},
    path::{Component, Path, PathBuf},
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::{
    request::{
        MAX_FILE_SIZE, MAX_INLINE_KEY, MAX_JSON_SIZE, MAX_PATH_LEN, Output, Request, Token,
        WorkerError, WorkerResult,
    },
    rle,
};

/// Depth of the request and result queues.
pub const QUEUE_DEPTH: usize = 8;

/// Submission failures, returned synchronously.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Request queue full; retry next tick.
    #[error("worker queue full")]
    Backpressured,

    /// The worker thread is gone.
    #[error("worker stopped")]
    Stopped,
}

/// Storage roots the worker resolves device paths against.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for ordinary paths (internal flash).
    pub internal_root: PathBuf,
    /// Root for `/sd/...` paths (removable storage).
    pub sd_root: PathBuf,
}

/// Handle to the worker thread, owned by the main loop.
pub struct Worker {
    request_tx: Option<Sender<(Token, Request)>>,
    result_rx: Receiver<WorkerResult>,
    thread: Option<JoinHandle<()>>,
    next_token: u64,
    retired: HashSet<Token>,
}

impl Worker {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// `WorkerError::Io` if the OS refuses to spawn the thread.
    pub fn spawn(config: WorkerConfig) -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<(Token, Request)>(QUEUE_DEPTH);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<WorkerResult>(QUEUE_DEPTH);

        let thread = std::thread::Builder::new()
            .name("meshcore-worker".into())
            .spawn(move || run_worker(&config, &request_rx, &result_tx))
            .map_err(|e| WorkerError::Io(e.to_string()))?;

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            thread: Some(thread),
            next_token: 0,
            retired: HashSet::new(),
        })
    }

    /// Submit a request; ownership of its buffers moves to the worker.
    ///
    /// # Errors
    ///
    /// - `SubmitError::Backpressured` when the queue is full
    /// - `SubmitError::Stopped` when the worker thread has exited
    pub fn submit(&mut self, request: Request) -> Result<Token, SubmitError> {
        let token = Token(self.next_token);
        let Some(tx) = self.request_tx.as_ref() else {
            return Err(SubmitError::Stopped);
        };
        match tx.try_send((token, request)) {
            Ok(()) => {
                self.next_token += 1;
                Ok(token)
            },
            Err(TrySendError::Full(_)) => Err(SubmitError::Backpressured),
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::Stopped),
        }
    }

    /// Take the next finished result, if any. Results whose token was
    /// retired are silently dropped here.
    pub fn poll_result(&mut self) -> Option<WorkerResult> {
        while let Ok(result) = self.result_rx.try_recv() {
            if self.retired.remove(&result.token) {
                tracing::debug!(token = result.token.value(), "dropping retired result");
                continue;
            }
            return Some(result);
        }
        None
    }

    /// Mark a token's continuation as dead; its result will be drained
    /// without delivery.
    pub fn retire(&mut self, token: Token) {
        self.retired.insert(token);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop; draining the
        // result channel unblocks any in-flight send.
        self.request_tx = None;
        while self.result_rx.recv().is_ok() {}
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_worker(
    config: &WorkerConfig,
    requests: &Receiver<(Token, Request)>,
    results: &Sender<WorkerResult>,
) {
    for (token, request) in requests {
        let outcome = perform(config, request);
        if let Err(ref err) = outcome {
            tracing::debug!(token = token.value(), %err, "worker op failed");
        }
        if results.send(WorkerResult { token, outcome }).is_err() {
            // Handle dropped; nothing left to answer to.
            return;
        }
    }
}

fn perform(config: &WorkerConfig, request: Request) -> Result<Output, WorkerError> {
    match request {
        Request::Read { path } => {
            let path = resolve(config, &path)?;
            let size = fs::metadata(&path).map_err(io_err)?.len();
            if size > MAX_FILE_SIZE {
                return Err(WorkerError::TooLarge { size, max: MAX_FILE_SIZE });
            }
            Ok(Output::Bytes(fs::read(&path).map_err(io_err)?))
        },
        Request::ReadBytes { path, offset, len } => {
            let path = resolve(config, &path)?;
            Ok(Output::Bytes(read_range(&path, offset, len)?))
        },
        Request::Write { path, data } => {
            let path = resolve(config, &path)?;
            fs::write(&path, &data).map_err(io_err)?;
            Ok(Output::Bool(true))
        },
        Request::WriteBytes { path, offset, data } => {
            let path = resolve(config, &path)?;
            let mut file = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(io_err)?;
            file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
            file.write_all(&data).map_err(io_err)?;
            Ok(Output::Bool(true))
        },
        Request::Append { path, data } => {
            let path = resolve(config, &path)?;
            let mut file = fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(io_err)?;
            file.write_all(&data).map_err(io_err)?;
            Ok(Output::Bool(true))
        },
        Request::Exists { path } => {
            let path = resolve(config, &path)?;
            Ok(Output::Bool(path.exists()))
        },
        Request::JsonRead { path } => {
            let path = resolve(config, &path)?;
            let size = fs::metadata(&path).map_err(io_err)?.len();
            if size > MAX_JSON_SIZE as u64 {
                return Err(WorkerError::TooLarge { size, max: MAX_JSON_SIZE as u64 });
            }
            Ok(Output::Text(fs::read_to_string(&path).map_err(io_err)?))
        },
        Request::JsonWrite { path, text } => {
            if text.len() > MAX_JSON_SIZE {
                return Err(WorkerError::TooLarge {
                    size: text.len() as u64,
                    max: MAX_JSON_SIZE as u64,
                });
            }
            let path = resolve(config, &path)?;
            fs::write(&path, text.as_bytes()).map_err(io_err)?;
            Ok(Output::Bool(true))
        },
        Request::RleRead { path, offset, len } => {
            let path = resolve(config, &path)?;
            let compressed = read_range(&path, offset, len)?;
            Ok(Output::Bytes(rle::decode(&compressed, rle::RLE_DECODE_BUDGET)?))
        },
        Request::RleReadRgb565 { path, offset, len, palette } => {
            let path = resolve(config, &path)?;
            let compressed = read_range(&path, offset, len)?;
            let indexed = rle::decode(&compressed, rle::RLE_DECODE_BUDGET)?;
            Ok(Output::Bytes(rle::unpack_rgb565(&indexed, &palette)?))
        },
        Request::AesEncrypt { key, data } => {
            Ok(Output::Bytes(meshcore_crypto::aes_ecb_encrypt(&key, &data)))
        },
        Request::AesDecrypt { key, data } => {
            meshcore_crypto::aes_ecb_decrypt(&key, &data)
                .map(Output::Bytes)
                .map_err(|_| WorkerError::Misaligned(data.len()))
        },
        Request::HmacSha256 { key, data } => {
            if key.len() > MAX_INLINE_KEY {
                return Err(WorkerError::KeyTooLong(key.len()));
            }
            Ok(Output::Bytes(meshcore_crypto::hmac_sha256(&key, &data).to_vec()))
        },
    }
}

/// Map a device path onto the configured storage roots.
///
/// `/sd/...` goes to removable storage, everything else to internal
/// flash. `..` components are rejected outright.
fn resolve(config: &WorkerConfig, device_path: &str) -> Result<PathBuf, WorkerError> {
    if device_path.len() > MAX_PATH_LEN {
        return Err(WorkerError::PathTooLong(device_path.len()));
    }

    let (root, relative) = match device_path.strip_prefix("/sd/") {
        Some(rest) => (&config.sd_root, rest),
        None => (&config.internal_root, device_path.trim_start_matches('/')),
    };

    let relative = Path::new(relative);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(WorkerError::InvalidPath);
    }
    Ok(root.join(relative))
}

fn read_range(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, WorkerError> {
    let mut file = fs::File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();

    // Clamp the range to end-of-file.
    let start = offset.min(size);
    let available = (size - start) as usize;
    let len = len.min(available);

    file.seek(SeekFrom::Start(start)).map_err(io_err)?;
    let mut data = vec![0u8; len];
    file.read_exact(&mut data).map_err(io_err)?;
    Ok(data)
}

fn io_err(err: std::io::Error) -> WorkerError {
    WorkerError::Io(err.to_string())
}
