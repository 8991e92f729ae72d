//! Linux process connector (netlink `NETLINK_CONNECTOR`, `CN_IDX_PROC`).
//! Receives exec events kernel-wide and matches them by `/proc/<pid>/comm`.
//! Subscribing requires CAP_NET_ADMIN; without it `open` fails and the
//! watchdog stays on polling.

use super::CreationSource;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

const CN_IDX_PROC: u32 = 1;
const CN_VAL_PROC: u32 = 1;
const PROC_CN_MCAST_LISTEN: u32 = 1;
const PROC_EVENT_EXEC: u32 = 0x0000_0002;

const NLMSG_HDR_LEN: usize = 16;
const CN_MSG_LEN: usize = 20;
/// Offset of `proc_event` inside one netlink message.
const EVENT_OFFSET: usize = NLMSG_HDR_LEN + CN_MSG_LEN;
/// `what`, `cpu`, `timestamp_ns`, then `exec.process_pid`, `exec.process_tgid`.
const EXEC_TGID_OFFSET: usize = EVENT_OFFSET + 20;
/// Kernel truncates `comm` to TASK_COMM_LEN - 1 bytes.
const COMM_MAX: usize = 15;

pub struct ProcConnector {
    fd: OwnedFd,
    target: String,
    buf: Vec<u8>,
}

impl ProcConnector {
    pub fn open(target: &str) -> io::Result<Self> {
        let fd = connector_socket()?;
        let port = bind_assigned(&fd, CN_IDX_PROC)?;

        let msg = listen_message(port);
        // SAFETY: sending an initialized buffer of the stated length.
        let sent = unsafe {
            libc::send(
                fd.as_raw_fd(),
                msg.as_ptr() as *const libc::c_void,
                msg.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }

        let target = target.to_ascii_lowercase();
        let target = match target.char_indices().nth(COMM_MAX) {
            Some((idx, _)) => target[..idx].to_string(),
            None => target,
        };
        Ok(Self {
            fd,
            target,
            buf: vec![0u8; 8192],
        })
    }

    fn comm_matches(&self, tgid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{tgid}/comm"))
            .map(|comm| comm.trim_end().eq_ignore_ascii_case(&self.target))
            .unwrap_or(false)
    }
}

impl CreationSource for ProcConnector {
    fn next_creations(&mut self, timeout: Duration) -> io::Result<usize> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        // SAFETY: one valid pollfd.
        let ready = unsafe { libc::poll(&mut pfd, 1, ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(0);
        }

        // SAFETY: buffer is valid for its full length.
        let n = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                self.buf.as_mut_ptr() as *mut libc::c_void,
                self.buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }

        let tgids = exec_tgids(&self.buf[..n as usize]);
        Ok(tgids.into_iter().filter(|t| self.comm_matches(*t)).count())
    }
}

fn connector_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2); ownership moves into OwnedFd on success.
    let raw = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
            libc::NETLINK_CONNECTOR,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created, owned descriptor.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

/// Bind with port id 0 so the kernel assigns a unique one; returns it.
/// Several connectors can then coexist in one process.
fn bind_assigned(fd: &OwnedFd, groups: u32) -> io::Result<u32> {
    // SAFETY: sockaddr_nl is plain data; zeroed is a valid initial state.
    let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr.nl_pid = 0;
    addr.nl_groups = groups;
    let mut len = std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
    // SAFETY: addr is a valid sockaddr_nl for the given length.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
            len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: getsockname writes at most `len` bytes into addr.
    let rc = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut addr as *mut libc::sockaddr_nl as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(addr.nl_pid)
}

fn listen_message(port: u32) -> Vec<u8> {
    let total = NLMSG_HDR_LEN + CN_MSG_LEN + 4;
    let mut m = Vec::with_capacity(total);
    // nlmsghdr
    m.extend_from_slice(&(total as u32).to_ne_bytes());
    m.extend_from_slice(&(libc::NLMSG_DONE as u16).to_ne_bytes());
    m.extend_from_slice(&0u16.to_ne_bytes());
    m.extend_from_slice(&0u32.to_ne_bytes());
    m.extend_from_slice(&port.to_ne_bytes());
    // cn_msg
    m.extend_from_slice(&CN_IDX_PROC.to_ne_bytes());
    m.extend_from_slice(&CN_VAL_PROC.to_ne_bytes());
    m.extend_from_slice(&0u32.to_ne_bytes());
    m.extend_from_slice(&0u32.to_ne_bytes());
    m.extend_from_slice(&4u16.to_ne_bytes());
    m.extend_from_slice(&0u16.to_ne_bytes());
    // proc_cn_mcast_op
    m.extend_from_slice(&PROC_CN_MCAST_LISTEN.to_ne_bytes());
    m
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Thread-group ids of every exec event in a datagram (may carry several messages).
fn exec_tgids(datagram: &[u8]) -> Vec<u32> {
    let mut out = Vec::new();
    let mut offset = 0;
    while let Some(len) = read_u32(datagram, offset) {
        let len = len as usize;
        if len < NLMSG_HDR_LEN || offset + len > datagram.len() {
            break;
        }
        let msg = &datagram[offset..offset + len];
        if read_u32(msg, EVENT_OFFSET) == Some(PROC_EVENT_EXEC) {
            if let Some(tgid) = read_u32(msg, EXEC_TGID_OFFSET) {
                out.push(tgid);
            }
        }
        // NLMSG_ALIGN
        offset += (len + 3) & !3;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_message(tgid: u32, what: u32) -> Vec<u8> {
        let total = EXEC_TGID_OFFSET + 4;
        let mut m = vec![0u8; total];
        m[0..4].copy_from_slice(&(total as u32).to_ne_bytes());
        m[EVENT_OFFSET..EVENT_OFFSET + 4].copy_from_slice(&what.to_ne_bytes());
        m[EXEC_TGID_OFFSET - 4..EXEC_TGID_OFFSET].copy_from_slice(&tgid.to_ne_bytes());
        m[EXEC_TGID_OFFSET..EXEC_TGID_OFFSET + 4].copy_from_slice(&tgid.to_ne_bytes());
        m
    }

    #[test]
    fn listen_message_layout() {
        let m = listen_message(42);
        assert_eq!(m.len(), 40);
        assert_eq!(read_u32(&m, 0), Some(40));
        assert_eq!(read_u32(&m, 12), Some(42));
        assert_eq!(read_u32(&m, 16), Some(CN_IDX_PROC));
        assert_eq!(read_u32(&m, 36), Some(PROC_CN_MCAST_LISTEN));
    }

    #[test]
    fn parses_exec_events_only() {
        let mut datagram = exec_message(1234, PROC_EVENT_EXEC);
        datagram.extend(exec_message(99, 0x0000_0001)); // fork
        datagram.extend(exec_message(77, PROC_EVENT_EXEC));
        assert_eq!(exec_tgids(&datagram), vec![1234, 77]);
    }

    #[test]
    fn two_sockets_in_one_process_both_bind() {
        // No multicast group: binding needs no privilege.
        let (a, b) = match (connector_socket(), connector_socket()) {
            (Ok(a), Ok(b)) => (a, b),
            // Connector family unavailable in this kernel/sandbox.
            _ => return,
        };
        let pa = bind_assigned(&a, 0).unwrap();
        let pb = bind_assigned(&b, 0).unwrap();
        assert_ne!(pa, 0);
        assert_ne!(pb, 0);
        assert_ne!(pa, pb);
    }

    #[test]
    fn truncated_datagram_is_ignored() {
        let datagram = exec_message(5, PROC_EVENT_EXEC);
        assert!(exec_tgids(&datagram[..20]).is_empty());
    }
}
