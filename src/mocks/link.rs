//! A [`Link`] double that serves preloaded bytes and records what was written to it.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::errors::{Error, LinkError};
use crate::link::Link;

#[derive(Clone, Debug, Default)]
pub struct MockLink {
    pub connected: bool,
    read_queue: VecDeque<u8>,
    pub written: Vec<u8>,
    /// Messages enqueued for `read_exact` to return one byte at a time.
    /// Returns `Closed` once exhausted, unless `loop_bytes` is set.
    pub loop_bytes: bool,
    /// Once exhausted, return a [`LinkError::Timeout`] forever instead of `Closed` —
    /// simulates a link that stays open but receives no further data, the way a real
    /// TCP/serial read times out repeatedly while the connection is still up.
    pub block_when_empty: bool,
    seed: Vec<u8>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-loads the bytes a test expects the device to have sent.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            connected: true,
            read_queue: bytes.clone().into(),
            written: Vec::new(),
            loop_bytes: false,
            seed: bytes,
        }
    }

    pub fn looping(mut self) -> Self {
        self.loop_bytes = true;
        self
    }

    /// Makes `read_exact` report a read timeout instead of `Closed` once the preloaded bytes
    /// are exhausted.
    pub fn blocking(mut self) -> Self {
        self.block_when_empty = true;
        self
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.read_queue.extend(bytes.iter().copied());
    }
}

impl Display for MockLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockLink")
    }
}

impl Link for MockLink {
    fn open(&mut self) -> Result<(), Error> {
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.connected = false;
        Ok(())
    }

    fn set_timeout(&mut self, _duration: Duration) -> Result<(), Error> {
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.written.extend_from_slice(buf);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        for slot in buf.iter_mut() {
            if self.read_queue.is_empty() {
                if self.loop_bytes && !self.seed.is_empty() {
                    self.read_queue.extend(self.seed.iter().copied());
                } else if self.block_when_empty {
                    return Err(Error::from(LinkError::Timeout));
                } else {
                    return Err(Error::from(LinkError::Closed));
                }
            }
            *slot = self.read_queue.pop_front().unwrap();
        }
        Ok(())
    }

    fn address(&self) -> String {
        "mock://link".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_exact_drains_queue() {
        let mut link = MockLink::with_bytes(vec![1, 2, 3]);
        let mut buf = [0u8; 2];
        link.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
    }

    #[test]
    fn test_read_exact_errors_when_exhausted() {
        let mut link = MockLink::with_bytes(vec![1]);
        let mut buf = [0u8; 2];
        assert!(link.read_exact(&mut buf).is_err());
    }

    #[test]
    fn test_looping_link_repeats_seed() {
        let mut link = MockLink::with_bytes(vec![9]).looping();
        let mut buf = [0u8; 4];
        link.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [9, 9, 9, 9]);
    }

    #[test]
    fn test_blocking_link_times_out_instead_of_closing() {
        let mut link = MockLink::with_bytes(vec![1]).blocking();
        let mut buf = [0u8; 2];
        let err = link.read_exact(&mut buf).unwrap_err();
        assert!(err.is_link_timeout());
    }

    #[test]
    fn test_write_is_recorded() {
        let mut link = MockLink::new();
        link.write(&[0xF0, 0x01]).unwrap();
        assert_eq!(link.written, vec![0xF0, 0x01]);
    }
}
