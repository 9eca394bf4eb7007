//! Open file handles.
//!
//! A handle buffers the whole file in memory. Content is read from the
//! facade on first access, mutated locally, and written back on `sync`,
//! `close`, or after every write when opened with the sync flag.

use tokio::sync::Mutex;

use super::facade::Vfs;
use super::flags::OpenFlags;
use super::types::{FileAttr, WriteOptions};
use super::{VfsError, VfsResult};

#[derive(Debug, Default)]
struct HandleState {
    content: Option<Vec<u8>>,
    position: u64,
    dirty: bool,
    closed: bool,
}

/// An open file.
///
/// All methods take `&self`; state is serialized by an internal async
/// mutex, so a handle can be shared across tasks behind an `Arc`.
pub struct FileHandle {
    vfs: Vfs,
    path: String,
    flags: OpenFlags,
    state: Mutex<HandleState>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl FileHandle {
    pub(super) fn new(vfs: Vfs, path: String, flags: OpenFlags) -> Self {
        // A truncating open with write access already emptied the file.
        let content = (flags.truncate && flags.access_mode.can_write()).then(Vec::new);
        Self {
            vfs,
            path,
            flags,
            state: Mutex::new(HandleState {
                content,
                ..Default::default()
            }),
        }
    }

    /// Path this handle was opened on (normalized).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flags the handle was opened with.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Returns true once `close` has run.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Current cursor position.
    pub async fn position(&self) -> u64 {
        self.state.lock().await.position
    }

    /// Move the cursor.
    pub async fn seek(&self, position: u64) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;
        state.position = position;
        Ok(())
    }

    /// Read at the cursor, advancing it. Returns the number of bytes read.
    pub async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        self.ensure_readable(&state)?;
        let position = state.position;
        let content = self.materialize(&mut state).await?;
        let n = copy_out(content, position, buf);
        state.position += n as u64;
        Ok(n)
    }

    /// Read at `offset` without moving the cursor.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        self.ensure_readable(&state)?;
        let content = self.materialize(&mut state).await?;
        Ok(copy_out(content, offset, buf))
    }

    /// Everything from the cursor to the end of the file.
    pub async fn read_to_end(&self) -> VfsResult<Vec<u8>> {
        let mut state = self.state.lock().await;
        self.ensure_readable(&state)?;
        let position = state.position;
        let content = self.materialize(&mut state).await?;
        let start = usize::try_from(position).unwrap_or(usize::MAX).min(content.len());
        let out = content[start..].to_vec();
        state.position += out.len() as u64;
        Ok(out)
    }

    /// Write at the cursor (or at the end for append handles), advancing it.
    pub async fn write(&self, data: &[u8]) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        self.ensure_writable(&state)?;
        let position = state.position;
        let append = self.flags.append;
        let content = self.materialize(&mut state).await?;
        let offset = if append { content.len() as u64 } else { position };
        copy_in(content, offset, data)?;
        state.position = offset + data.len() as u64;
        self.after_write(&mut state).await?;
        Ok(data.len())
    }

    /// Write at `offset` without moving the cursor.
    ///
    /// Append handles ignore `offset` and write at the end.
    pub async fn write_at(&self, data: &[u8], offset: u64) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        self.ensure_writable(&state)?;
        let append = self.flags.append;
        let content = self.materialize(&mut state).await?;
        let offset = if append { content.len() as u64 } else { offset };
        copy_in(content, offset, data)?;
        self.after_write(&mut state).await?;
        Ok(data.len())
    }

    /// Truncate or zero-extend to `len` bytes.
    pub async fn truncate(&self, len: u64) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_writable(&state)?;
        let len = usize::try_from(len)
            .map_err(|_| VfsError::invalid_argument(format!("truncate length {len} too large")))?;
        let content = self.materialize(&mut state).await?;
        content.resize(len, 0);
        self.after_write(&mut state).await
    }

    /// Attributes of the file, with `size` reflecting unflushed writes.
    pub async fn stat(&self) -> VfsResult<FileAttr> {
        let state = self.state.lock().await;
        self.ensure_open(&state)?;
        let mut attr = self.vfs.stat(&self.path).await?;
        if let Some(content) = &state.content {
            attr.size = content.len() as u64;
        }
        Ok(attr)
    }

    /// Write buffered changes back to storage.
    pub async fn sync(&self) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;
        self.flush(&mut state).await
    }

    /// Flush and close. Closing an already-closed handle is a no-op.
    ///
    /// Concurrent callers serialize on the handle's mutex; the first one
    /// flushes, the rest observe the closed state.
    pub async fn close(&self) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        let flushed = self.flush(&mut state).await;
        state.closed = true;
        state.content = None;
        tracing::trace!(path = %self.path, "handle closed");
        flushed
    }

    fn ensure_open(&self, state: &HandleState) -> VfsResult<()> {
        if state.closed {
            return Err(VfsError::bad_descriptor(format!("{}: handle is closed", self.path)));
        }
        Ok(())
    }

    fn ensure_readable(&self, state: &HandleState) -> VfsResult<()> {
        self.ensure_open(state)?;
        if !self.flags.access_mode.can_read() {
            return Err(VfsError::bad_descriptor(format!("{}: not open for reading", self.path)));
        }
        Ok(())
    }

    fn ensure_writable(&self, state: &HandleState) -> VfsResult<()> {
        self.ensure_open(state)?;
        if !self.flags.access_mode.can_write() {
            return Err(VfsError::bad_descriptor(format!("{}: not open for writing", self.path)));
        }
        Ok(())
    }

    async fn materialize<'a>(&self, state: &'a mut HandleState) -> VfsResult<&'a mut Vec<u8>> {
        if state.content.is_none() {
            let data = self.vfs.read_file(&self.path).await?;
            state.content = Some(data);
        }
        Ok(state.content.get_or_insert_with(Vec::new))
    }

    async fn after_write(&self, state: &mut HandleState) -> VfsResult<()> {
        state.dirty = true;
        if self.flags.sync {
            self.flush(state).await?;
        }
        Ok(())
    }

    async fn flush(&self, state: &mut HandleState) -> VfsResult<()> {
        if !state.dirty {
            return Ok(());
        }
        if let Some(content) = &state.content {
            self.vfs
                .write_file(&self.path, content, WriteOptions::default())
                .await?;
        }
        state.dirty = false;
        Ok(())
    }
}

fn copy_out(content: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= content.len() {
        return 0;
    }
    let n = buf.len().min(content.len() - start);
    buf[..n].copy_from_slice(&content[start..start + n]);
    n
}

fn copy_in(content: &mut Vec<u8>, offset: u64, data: &[u8]) -> VfsResult<()> {
    let start = usize::try_from(offset)
        .map_err(|_| VfsError::invalid_argument(format!("offset {offset} too large")))?;
    let end = start
        .checked_add(data.len())
        .ok_or_else(|| VfsError::invalid_argument("write extends past addressable range"))?;
    if content.len() < end {
        content.resize(end, 0);
    }
    content[start..end].copy_from_slice(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::bits;
    use std::sync::Arc;
    use txfs_types::ErrorCode;

    async fn setup() -> Vfs {
        let vfs = Vfs::memory();
        vfs.write_file("/f.txt", b"hello world", WriteOptions::default())
            .await
            .unwrap();
        vfs
    }

    #[tokio::test]
    async fn test_read_is_lazy_and_advances() {
        let vfs = setup().await;
        let handle = vfs.open("/f.txt", OpenFlags::read(), None).await.unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(handle.read(&mut buf).await.unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(handle.position().await, 5);

        let mut rest = [0u8; 32];
        let n = handle.read(&mut rest).await.unwrap();
        assert_eq!(&rest[..n], b" world");
        assert_eq!(handle.read(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_at_keeps_cursor() {
        let vfs = setup().await;
        let handle = vfs.open("/f.txt", OpenFlags::read(), None).await.unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(handle.read_at(&mut buf, 6).await.unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(handle.position().await, 0);
    }

    #[tokio::test]
    async fn test_read_only_truncate_keeps_content() {
        let vfs = setup().await;
        let flags = OpenFlags::from_bits(bits::O_RDONLY | bits::O_TRUNC).unwrap();
        let handle = vfs.open("/f.txt", flags, None).await.unwrap();

        assert_eq!(handle.read_to_end().await.unwrap(), b"hello world");
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_wrong_mode_is_ebadf() {
        let vfs = setup().await;
        let reader = vfs.open("/f.txt", OpenFlags::read(), None).await.unwrap();
        assert_eq!(reader.write(b"x").await.unwrap_err().code(), ErrorCode::Ebadf);

        let writer = vfs.open("/f.txt", OpenFlags::parse("r+").unwrap(), None).await.unwrap();
        writer.write(b"J").await.unwrap();
        let write_only = vfs.open("/g.txt", OpenFlags::write(), None).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(write_only.read(&mut buf).await.unwrap_err().code(), ErrorCode::Ebadf);
    }

    #[tokio::test]
    async fn test_write_flushes_on_close() {
        let vfs = setup().await;
        let handle = vfs.open("/f.txt", OpenFlags::parse("r+").unwrap(), None).await.unwrap();
        handle.write(b"HELLO").await.unwrap();

        // not visible until flushed
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"hello world");
        assert_eq!(handle.stat().await.unwrap().size, 11);

        handle.close().await.unwrap();
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"HELLO world");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_use() {
        let vfs = setup().await;
        let handle = Arc::new(vfs.open("/f.txt", OpenFlags::parse("r+").unwrap(), None).await.unwrap());
        handle.write(b"X").await.unwrap();

        let (a, b) = tokio::join!(handle.close(), handle.close());
        a.unwrap();
        b.unwrap();
        handle.close().await.unwrap();
        assert!(handle.is_closed().await);

        let mut buf = [0u8; 1];
        assert_eq!(handle.read(&mut buf).await.unwrap_err().code(), ErrorCode::Ebadf);
        assert_eq!(handle.sync().await.unwrap_err().code(), ErrorCode::Ebadf);
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"Xello world");
    }

    #[tokio::test]
    async fn test_append_always_writes_at_end() {
        let vfs = setup().await;
        let handle = vfs.open("/f.txt", OpenFlags::append(), None).await.unwrap();
        handle.write_at(b"!", 0).await.unwrap();
        handle.write(b"?").await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"hello world!?");
    }

    #[tokio::test]
    async fn test_sync_flag_flushes_every_write() {
        let vfs = setup().await;
        let handle = vfs.open("/f.txt", OpenFlags::parse("rs+").unwrap(), None).await.unwrap();
        handle.write_at(b"J", 0).await.unwrap();
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"Jello world");
    }

    #[tokio::test]
    async fn test_truncate_and_sparse_write() {
        let vfs = setup().await;
        let handle = vfs.open("/f.txt", OpenFlags::parse("r+").unwrap(), None).await.unwrap();
        handle.truncate(2).await.unwrap();
        handle.write_at(b"z", 4).await.unwrap();
        handle.sync().await.unwrap();
        assert_eq!(vfs.read_file("/f.txt").await.unwrap(), b"he\0\0z");
    }
}
