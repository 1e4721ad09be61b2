//! Input state machines: paste and auto-play.
//!
//! Both machines turn a byte stream into keystrokes, one line per card. They
//! only advance from the idle hook, that is, when the event queue is empty
//! and the power is on, so a line is never typed into a card that is still
//! moving. Reads never block: a source with nothing to offer parks the
//! auto-play machine until the driver reports that input is ready.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::MachineKey;
use crate::config::{Mode, Speed, Switch};
use crate::deck::CardSink;
use crate::error::{KeypunchError, Result};
use crate::eventq::Op;
use crate::machine::Keypunch;
use crate::render::Render;
use crate::station::PunchState;

/// Bytes pulled from a source per read.
pub const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsmState {
    /// Waiting for bytes.
    #[default]
    Read,
    /// Typing the buffered line.
    Char,
    /// End of line: release the card.
    Space,
    /// The source is exhausted; start the shutdown.
    Eof,
    /// Shutdown queued; nothing more to do.
    Done,
}

/// A non-blocking byte source.
pub trait ByteSource {
    fn name(&self) -> &str;

    /// `Ok(0)` is end of input. An error of kind
    /// [`WouldBlock`](io::ErrorKind::WouldBlock) means nothing is available
    /// yet.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Block up to `timeout` (forever for `None`) until [`read`](Self::read)
    /// would not report `WouldBlock`. Returns whether that is now the case.
    fn wait_readable(&mut self, _timeout: Option<Duration>) -> io::Result<bool> {
        Ok(true)
    }
}

/// Bytes held in memory, handed out in chunks of at most `chunk` bytes.
#[derive(Debug)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            pos: 0,
            chunk: READ_CHUNK,
        }
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }
}

impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A regular file. Reads from disk never report `WouldBlock`.
#[derive(Debug)]
pub struct FileSource {
    name: String,
    file: File,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|source| KeypunchError::Read {
            source_name: name.clone(),
            source,
        })?;
        Ok(Self { name, file })
    }
}

impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// A blocking reader (usually stdin) drained by a helper thread.
///
/// The thread forwards whatever each blocking read returns over a channel;
/// an empty channel reads as `WouldBlock` and a closed one as end of input.
pub struct ChannelSource {
    name: String,
    rx: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    failed: Option<io::Error>,
}

impl ChannelSource {
    pub fn spawn<R>(name: impl Into<String>, mut reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel();
        let thread_name = format!("read-{name}");
        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(chunk[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        let failed = spawned.err();
        Self {
            name,
            rx,
            pending: Vec::new(),
            failed,
        }
    }

    pub fn stdin() -> Self {
        Self::spawn("stdin", io::stdin())
    }

    fn stash(&mut self, msg: io::Result<Vec<u8>>) {
        match msg {
            Ok(bytes) => self.pending.extend_from_slice(&bytes),
            Err(e) => self.failed = Some(e),
        }
    }
}

impl ByteSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if let Some(e) = self.failed.take() {
                return Err(e);
            }
            match self.rx.try_recv() {
                Ok(msg) => self.stash(msg),
                Err(TryRecvError::Empty) => return Err(io::ErrorKind::WouldBlock.into()),
                Err(TryRecvError::Disconnected) => return Ok(0),
            }
            if let Some(e) = self.failed.take() {
                return Err(e);
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        if !self.pending.is_empty() || self.failed.is_some() {
            return Ok(true);
        }
        let msg = match timeout {
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Ok(true),
            },
            None => match self.rx.recv() {
                Ok(msg) => msg,
                Err(_) => return Ok(true),
            },
        };
        self.stash(msg);
        Ok(true)
    }
}

/// Context of one input machine.
pub struct InputFsm {
    name: &'static str,
    /// `None` for paste, which is fed from the clipboard instead of read.
    source: Option<Box<dyn ByteSource>>,
    state: FsmState,
    buf: Vec<u8>,
    cursor: usize,
    awaiting_input: bool,
}

impl InputFsm {
    pub fn paste() -> Self {
        Self {
            name: "paste",
            source: None,
            state: FsmState::Read,
            buf: Vec::new(),
            cursor: 0,
            awaiting_input: false,
        }
    }

    pub fn auto_play(source: Option<Box<dyn ByteSource>>) -> Self {
        Self {
            name: "auto-play",
            source,
            state: FsmState::Read,
            buf: Vec::new(),
            cursor: 0,
            awaiting_input: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Parked on a source that had nothing to read.
    pub fn is_awaiting_input(&self) -> bool {
        self.awaiting_input
    }

    /// Unconsumed bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Whether paste has anything to type; it is idle only in `Read`.
    pub fn is_active(&self) -> bool {
        self.state != FsmState::Read
    }

    /// Append one pasted byte.
    ///
    /// The first byte after an idle spell starts the machine typing.
    /// Otherwise the consumed prefix is dropped first, so a long paste does
    /// not keep its typed text alive.
    pub fn push_paste(&mut self, byte: u8) {
        if self.buf.is_empty() {
            self.state = FsmState::Char;
        } else {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buf.push(byte);
    }

    /// Block until the source has data, for at most `timeout`.
    pub fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        match self.source.as_mut() {
            Some(src) => src.wait_readable(timeout),
            None => Ok(false),
        }
    }

    pub(crate) fn clear_interest(&mut self) {
        self.awaiting_input = false;
    }

    fn next_byte(&mut self) -> Option<u8> {
        let b = self.buf.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(b)
    }

    fn release_buffer(&mut self) {
        self.buf = Vec::new();
        self.cursor = 0;
    }
}

impl std::fmt::Debug for InputFsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFsm")
            .field("name", &self.name)
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("state", &self.state)
            .field("remaining", &self.remaining())
            .field("awaiting_input", &self.awaiting_input)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    Paste,
    AutoPlay,
}

enum Flow {
    Continue,
    Suspend,
}

impl<R: Render, S: CardSink> Keypunch<R, S> {
    /// Idle hook: give the input machines a turn. Paste wins over auto-play;
    /// auto-play only runs when the machine is not interactive.
    pub(crate) fn run_fsms(&mut self) -> Result<()> {
        if !self.queue.is_idle() || !self.power_on {
            return Ok(());
        }
        if self.paste.is_active() {
            self.run_fsm(Which::Paste)
        } else if self.mode != Mode::Interactive {
            self.run_fsm(Which::AutoPlay)
        } else {
            Ok(())
        }
    }

    fn fsm_mut(&mut self, which: Which) -> &mut InputFsm {
        match which {
            Which::Paste => &mut self.paste,
            Which::AutoPlay => &mut self.autoplay,
        }
    }

    fn run_fsm(&mut self, which: Which) -> Result<()> {
        while self.queue.is_idle() && self.power_on {
            let fsm = self.fsm_mut(which);
            let state = fsm.state;
            debug!(fsm = fsm.name, ?state, "fsm step");
            match state {
                FsmState::Read => {
                    if let Flow::Suspend = self.fsm_read(which)? {
                        return Ok(());
                    }
                }
                FsmState::Char => self.fsm_char(which),
                FsmState::Space => self.fsm_space(which),
                FsmState::Eof => self.fsm_eof(which),
                FsmState::Done => return Ok(()),
            }
        }
        Ok(())
    }

    fn fsm_read(&mut self, which: Which) -> Result<Flow> {
        let fsm = self.fsm_mut(which);
        if fsm.remaining() > 0 {
            fsm.state = FsmState::Char;
            return Ok(Flow::Continue);
        }
        // Paste has nothing to read from; it waits for the next paste.
        let Some(src) = fsm.source.as_mut() else {
            if which == Which::AutoPlay {
                fsm.state = FsmState::Eof;
                return Ok(Flow::Continue);
            }
            return Ok(Flow::Suspend);
        };

        fsm.buf.resize(READ_CHUNK, 0);
        fsm.cursor = 0;
        match src.read(&mut fsm.buf) {
            Ok(0) => {
                info!(source = src.name(), "end of input");
                fsm.awaiting_input = false;
                fsm.source = None;
                fsm.release_buffer();
                fsm.state = FsmState::Eof;
                Ok(Flow::Continue)
            }
            Ok(n) => {
                debug!(source = src.name(), bytes = n, "read");
                fsm.buf.truncate(n);
                fsm.state = FsmState::Char;
                Ok(Flow::Continue)
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                fsm.buf.clear();
                fsm.awaiting_input = true;
                Ok(Flow::Suspend)
            }
            Err(source) => {
                let source_name = src.name().to_string();
                fsm.release_buffer();
                warn!(source = %source_name, error = %source, "read failed");
                Err(KeypunchError::Read {
                    source_name,
                    source,
                })
            }
        }
    }

    fn fsm_char(&mut self, which: Which) {
        if self.punch_state != PunchState::Registered {
            if self.mode == Mode::Batch && !self.fed {
                self.fed = true;
                self.press_key(MachineKey::Feed);
            }
            self.do_feed(false);
            if self.mode == Mode::Batch {
                let pause = self.config.delay(Speed::VerySlow);
                self.enqueue(Op::Dummy, false, pause);
            }
            return;
        }

        let Some(c) = self.fsm_mut(which).next_byte() else {
            self.fsm_mut(which).state = FsmState::Read;
            return;
        };
        if c == b'\n' {
            let pause = if self.col > 0 {
                self.config.delay(Speed::VerySlow)
            } else {
                0
            };
            self.enqueue(Op::PressRel, false, pause);
            self.fsm_mut(which).state = FsmState::Space;
            return;
        }

        self.did_auto_rel = false;
        self.add_char(c);
        let fsm = self.fsm_mut(which);
        if fsm.remaining() == 0 {
            fsm.state = FsmState::Read;
            if which == Which::Paste {
                fsm.release_buffer();
            }
        }
    }

    fn fsm_space(&mut self, which: Which) {
        // A full line already released itself at the last column.
        if !std::mem::take(&mut self.did_auto_rel) {
            self.do_release(Speed::Fast);
            // A file in batch mode feeds when its next line arrives.
            if self.mode == Mode::RemoteCtl || which == Which::Paste {
                self.do_feed(false);
            }
        }
        let fsm = self.fsm_mut(which);
        if fsm.remaining() > 0 {
            fsm.state = FsmState::Char;
        } else {
            fsm.state = FsmState::Read;
            if which == Which::Paste {
                fsm.release_buffer();
            }
        }
    }

    fn fsm_eof(&mut self, which: Which) {
        let name = self.fsm_mut(which).name;
        info!(fsm = name, "input exhausted, shutting down");
        self.set_switch(Switch::AutoFeed, false);
        let pause = self.config.shutdown_delay;
        self.enqueue(Op::ClearSeq, false, pause);
        self.fsm_mut(which).state = FsmState::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_reads_in_chunks_then_ends() {
        let mut src = MemorySource::new("mem", b"ABCDE".to_vec()).with_chunk(2);
        let mut buf = [0u8; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"AB");
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(src.read(&mut buf).unwrap(), 1);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn channel_source_would_block_until_data_arrives() {
        let (mut writer, reader) = pipe();
        let mut src = ChannelSource::spawn("pipe", reader);
        let mut buf = [0u8; 16];
        let err = src.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        use std::io::Write;
        writer.write_all(b"HI\n").unwrap();
        drop(writer);
        assert!(src.wait_readable(Some(Duration::from_secs(5))).unwrap());
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"HI\n");
        assert!(src.wait_readable(Some(Duration::from_secs(5))).unwrap());
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn paste_compacts_consumed_prefix() {
        let mut fsm = InputFsm::paste();
        assert!(!fsm.is_active());
        fsm.push_paste(b'A');
        assert_eq!(fsm.state(), FsmState::Char);
        fsm.push_paste(b'B');
        assert_eq!(fsm.next_byte(), Some(b'A'));
        fsm.push_paste(b'C');
        assert_eq!(fsm.buf, b"BC");
        assert_eq!(fsm.remaining(), 2);
    }

    /// Reader half of an in-process pipe.
    struct PipeReader(Receiver<Vec<u8>>, Vec<u8>);
    struct PipeWriter(mpsc::Sender<Vec<u8>>);

    impl Read for PipeReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.1.is_empty() {
                match self.0.recv() {
                    Ok(bytes) => self.1 = bytes,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.1.len());
            buf[..n].copy_from_slice(&self.1[..n]);
            self.1.drain(..n);
            Ok(n)
        }
    }

    impl std::io::Write for PipeWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .send(buf.to_vec())
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn pipe() -> (PipeWriter, PipeReader) {
        let (tx, rx) = mpsc::channel();
        (PipeWriter(tx), PipeReader(rx, Vec::new()))
    }
}
