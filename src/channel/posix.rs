//! POSIX message queue backend
//!
//! Channels are kernel message queues opened with `mq_open(3)`. The kernel
//! serializes concurrent senders and receivers, keeps FIFO order for equal
//! priorities and never exposes a partial message, so frames need no locking
//! here.
//!
//! The descriptor itself does: `close` may run while another thread is blocked
//! in `send` or `receive`. Closing it there would let the next `open` in this
//! process reuse the number under the blocked call, so `close` marks the handle
//! closed at once and the descriptor is released by whichever of `close` or
//! the last in-flight call finishes last.

use std::ffi::CString;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    check_frame_size, ChannelAttributes, ChannelBackend, ChannelHandle, ChannelName, Frame,
    HostLimits,
};
use crate::error::{ChannelError, ChannelErrorKind, ChannelOp};

/// Permission bits for newly created queues (rw-r--r--)
const QUEUE_MODE: libc::mode_t = 0o644;

/// All frames share one priority so delivery is strictly FIFO
const FRAME_PRIORITY: libc::c_uint = 0;

/// Backend over the host's POSIX message queues
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixBackend;

impl PosixBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ChannelBackend for PosixBackend {
    fn open(
        &self,
        name: &ChannelName,
        attrs: ChannelAttributes,
    ) -> Result<Arc<dyn ChannelHandle>, ChannelError> {
        Ok(Arc::new(PosixHandle::open(name, attrs)?))
    }

    fn unlink(&self, name: &ChannelName) -> Result<(), ChannelError> {
        let c_name = c_name(ChannelOp::Remove, name)?;

        // SAFETY: name is NUL-terminated.
        if unsafe { libc::mq_unlink(c_name.as_ptr()) } == -1 {
            return Err(ChannelError::last_os_error(ChannelOp::Remove, name));
        }
        Ok(())
    }

    fn limits(&self) -> HostLimits {
        HostLimits::detect()
    }
}

fn c_name(op: ChannelOp, name: &ChannelName) -> Result<CString, ChannelError> {
    CString::new(name.as_str())
        .map_err(|_| ChannelError::new(op, name, ChannelErrorKind::InvalidName))
}

/// Ownership of the descriptor between `close` and in-flight calls
#[derive(Debug, Default)]
struct DescState {
    closed: bool,
    in_flight: usize,
    released: bool,
}

impl DescState {
    /// Whether the caller must run `mq_close` now
    fn take_release(&mut self) -> bool {
        if self.closed && self.in_flight == 0 && !self.released {
            self.released = true;
            return true;
        }
        false
    }
}

struct PosixHandle {
    name: ChannelName,
    mqd: libc::mqd_t,
    attrs: ChannelAttributes,
    desc: Mutex<DescState>,
}

/// Keeps the descriptor alive for the duration of one `send`/`receive`
struct InFlight<'a> {
    handle: &'a PosixHandle,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let release = {
            let mut desc = self.handle.desc();
            desc.in_flight -= 1;
            desc.take_release()
        };
        if release {
            if let Err(e) = self.handle.release() {
                tracing::warn!(channel = %self.handle.name, error = %e, "Deferred close failed");
            }
        }
    }
}

impl PosixHandle {
    fn open(name: &ChannelName, attrs: ChannelAttributes) -> Result<Self, ChannelError> {
        let c_name = c_name(ChannelOp::Open, name)?;

        // SAFETY: mq_attr is plain data; zero is valid for every field.
        let mut requested: libc::mq_attr = unsafe { std::mem::zeroed() };
        requested.mq_maxmsg = attrs.max_messages as libc::c_long;
        requested.mq_msgsize = attrs.message_size as libc::c_long;

        // SAFETY: name is NUL-terminated, the attr pointer is valid for the
        // call, and O_CREAT takes the mode and attr as variadic arguments.
        let mqd = unsafe {
            libc::mq_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_CLOEXEC,
                QUEUE_MODE as libc::c_uint,
                &mut requested as *mut libc::mq_attr,
            )
        };
        if mqd == -1 {
            return Err(ChannelError::last_os_error(ChannelOp::Open, name));
        }

        let handle = PosixHandle {
            name: name.clone(),
            mqd,
            attrs,
            desc: Mutex::new(DescState::default()),
        };

        // Attaching to an existing queue ignores the requested attributes
        let actual = match handle.query_attributes() {
            Ok(actual) => actual,
            Err(e) => {
                let _ = handle.close();
                return Err(e);
            }
        };
        if actual != attrs {
            let _ = handle.close();
            return Err(ChannelError::new(
                ChannelOp::Open,
                name,
                ChannelErrorKind::AttributeMismatch {
                    expected: (attrs.max_messages, attrs.message_size),
                    actual: (actual.max_messages, actual.message_size),
                },
            ));
        }

        tracing::debug!(channel = %name, mqd = mqd, "Opened message queue");
        Ok(handle)
    }

    fn desc(&self) -> MutexGuard<'_, DescState> {
        self.desc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: ChannelOp) -> Result<InFlight<'_>, ChannelError> {
        let mut desc = self.desc();
        if desc.closed {
            return Err(ChannelError::new(op, &self.name, ChannelErrorKind::Closed));
        }
        desc.in_flight += 1;
        Ok(InFlight { handle: self })
    }

    fn release(&self) -> Result<(), ChannelError> {
        // SAFETY: DescState hands out the release exactly once, and only when
        // no call is using the descriptor.
        if unsafe { libc::mq_close(self.mqd) } == -1 {
            return Err(ChannelError::last_os_error(ChannelOp::Close, &self.name));
        }
        Ok(())
    }

    fn query_attributes(&self) -> Result<ChannelAttributes, ChannelError> {
        // SAFETY: mq_attr is plain data; zero is valid for every field.
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };

        // SAFETY: mqd is open and attr points to writable storage.
        if unsafe { libc::mq_getattr(self.mqd, &mut attr) } == -1 {
            return Err(ChannelError::last_os_error(ChannelOp::Open, &self.name));
        }

        Ok(ChannelAttributes::new(
            attr.mq_maxmsg as usize,
            attr.mq_msgsize as usize,
        ))
    }

    fn ensure_open(&self, op: ChannelOp) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::new(op, &self.name, ChannelErrorKind::Closed));
        }
        Ok(())
    }
}

impl ChannelHandle for PosixHandle {
    fn name(&self) -> &ChannelName {
        &self.name
    }

    fn attributes(&self) -> ChannelAttributes {
        self.attrs
    }

    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        check_frame_size(&self.name, self.attrs, frame)?;
        let _in_flight = self.enter(ChannelOp::Send)?;

        let data = frame.as_bytes();
        loop {
            // SAFETY: data is valid for data.len() bytes and mqd is open.
            let rc = unsafe {
                libc::mq_send(
                    self.mqd,
                    data.as_ptr() as *const libc::c_char,
                    data.len(),
                    FRAME_PRIORITY,
                )
            };
            if rc == 0 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            // A signal landed while blocked on a full queue; not a channel fault
            if err.kind() == io::ErrorKind::Interrupted {
                self.ensure_open(ChannelOp::Send)?;
                continue;
            }
            return Err(ChannelError::os(ChannelOp::Send, &self.name, err));
        }
    }

    fn receive(&self) -> Result<Frame, ChannelError> {
        let _in_flight = self.enter(ChannelOp::Receive)?;

        // mq_receive requires a buffer of at least mq_msgsize bytes
        let mut buf = vec![0u8; self.attrs.message_size];
        let received = loop {
            let mut priority: libc::c_uint = 0;

            // SAFETY: buf is writable for buf.len() bytes and mqd is open.
            let n = unsafe {
                libc::mq_receive(
                    self.mqd,
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                    &mut priority,
                )
            };
            if n >= 0 {
                break n as usize;
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                self.ensure_open(ChannelOp::Receive)?;
                continue;
            }
            return Err(ChannelError::os(ChannelOp::Receive, &self.name, err));
        };

        if received != self.attrs.message_size {
            return Err(ChannelError::new(
                ChannelOp::Receive,
                &self.name,
                ChannelErrorKind::SizeMismatch {
                    expected: self.attrs.message_size,
                    actual: received,
                },
            ));
        }

        Ok(Frame::from(buf))
    }

    fn close(&self) -> Result<(), ChannelError> {
        let release = {
            let mut desc = self.desc();
            if desc.closed {
                return Err(ChannelError::new(
                    ChannelOp::Close,
                    &self.name,
                    ChannelErrorKind::AlreadyClosed,
                ));
            }
            desc.closed = true;
            desc.take_release()
        };

        if release {
            self.release()
        } else {
            tracing::debug!(channel = %self.name, "Close deferred until blocked call returns");
            Ok(())
        }
    }

    fn is_closed(&self) -> bool {
        self.desc().closed
    }
}

impl Drop for PosixHandle {
    fn drop(&mut self) {
        let desc = self.desc.get_mut().unwrap_or_else(PoisonError::into_inner);
        desc.closed = true;
        if desc.take_release() {
            let _ = self.release();
        }
    }
}
