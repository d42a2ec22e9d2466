//! Modem transport trait for abstraction and testability
//!
//! This trait defines the byte-level link to the modem (UART plus reset
//! line and a time base), allowing the real UART driver to be swapped with
//! a scripted mock for testing.

use core::fmt;
use core::future::Future;

/// Errors raised by the platform transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Write to the UART failed
    WriteFailed,
    /// Read from the UART failed
    ReadFailed,
    /// Driving the reset line failed
    ResetFailed,
    /// Transport used before init() or after deinit()
    NotInitialised,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WriteFailed => "write failed",
            Self::ReadFailed => "read failed",
            Self::ResetFailed => "reset failed",
            Self::NotInitialised => "not initialised",
        })
    }
}

/// Abstract modem link
///
/// Reads are non-blocking: `read()` returns whatever bytes have arrived so
/// far, possibly zero. All waiting goes through `delay_ms()`, so a fake
/// clock makes timing fully deterministic in tests.
pub trait ModemTransport {
    /// Bring up the link
    fn init(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Release the link
    fn deinit(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Write all bytes
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>>;

    /// Copy already-received bytes into `buf`, returning the count
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, TransportError>>;

    /// Drive the modem reset line (`false` holds the modem in reset)
    fn reset(&mut self, level: bool) -> impl Future<Output = Result<(), TransportError>>;

    /// Monotonic milliseconds
    fn now_ms(&self) -> u64;

    /// Sleep for the given number of milliseconds
    fn delay_ms(&mut self, ms: u32) -> impl Future<Output = ()>;
}

#[cfg(test)]
pub mod mock {
    //! Scripted modem transport for testing
    //!
    //! Replies are registered per command prefix and queued when the
    //! matching CR-terminated command is written. Time only moves inside
    //! `delay_ms()`.

    use super::*;
    use core::cell::RefCell;
    use std::collections::VecDeque;
    use std::string::String;
    use std::vec::Vec;

    struct Reply {
        prefix: String,
        response: Vec<u8>,
        delay_ms: u64,
    }

    /// Mock modem transport for unit testing
    pub struct MockTransport {
        /// Virtual clock
        now_ms: RefCell<u64>,
        /// Bytes to be returned by read(), with the time they arrive
        rx_queue: RefCell<VecDeque<(u64, u8)>>,
        /// Everything written via write()
        tx_buffer: RefCell<Vec<u8>>,
        /// Partial command line being written
        pending_line: RefCell<Vec<u8>>,
        /// Completed command lines, without the CR
        commands: RefCell<Vec<String>>,
        /// Replies used once, checked first
        replies_once: RefCell<Vec<Reply>>,
        /// Replies used for every matching command
        replies: RefCell<Vec<Reply>>,
        /// Bytes produced on every read (stuck or streaming modem)
        babble: RefCell<Option<Vec<u8>>>,
        /// Bytes emitted when the reset line is released
        boot_banner: RefCell<Vec<u8>>,
        /// Reset line history
        reset_levels: RefCell<Vec<bool>>,
        delay_calls: RefCell<u32>,
        read_calls: RefCell<u32>,
        /// Error to return on next read
        next_read_error: RefCell<Option<TransportError>>,
        /// Error to return on next write
        next_write_error: RefCell<Option<TransportError>>,
        /// Error to return on next reset
        next_reset_error: RefCell<Option<TransportError>>,
        initialised: RefCell<bool>,
    }

    impl MockTransport {
        /// Create a new mock transport
        pub fn new() -> Self {
            Self {
                now_ms: RefCell::new(0),
                rx_queue: RefCell::new(VecDeque::new()),
                tx_buffer: RefCell::new(Vec::new()),
                pending_line: RefCell::new(Vec::new()),
                commands: RefCell::new(Vec::new()),
                replies_once: RefCell::new(Vec::new()),
                replies: RefCell::new(Vec::new()),
                babble: RefCell::new(None),
                boot_banner: RefCell::new(Vec::new()),
                reset_levels: RefCell::new(Vec::new()),
                delay_calls: RefCell::new(0),
                read_calls: RefCell::new(0),
                next_read_error: RefCell::new(None),
                next_write_error: RefCell::new(None),
                next_reset_error: RefCell::new(None),
                initialised: RefCell::new(false),
            }
        }

        /// Queue data readable immediately
        pub fn queue_rx_data(&self, data: &[u8]) {
            let now = *self.now_ms.borrow();
            self.queue_rx_data_at(now, data);
        }

        /// Queue data that becomes readable at `at_ms`
        pub fn queue_rx_data_at(&self, at_ms: u64, data: &[u8]) {
            let mut rx = self.rx_queue.borrow_mut();
            rx.extend(data.iter().map(|&b| (at_ms, b)));
            rx.make_contiguous().sort_by_key(|(at, _)| *at);
        }

        /// Reply to every command starting with `prefix`
        pub fn respond(&self, prefix: &str, response: &[u8]) {
            self.replies.borrow_mut().push(Reply {
                prefix: prefix.into(),
                response: response.to_vec(),
                delay_ms: 0,
            });
        }

        /// Reply once to the next command starting with `prefix`
        pub fn respond_once(&self, prefix: &str, response: &[u8]) {
            self.respond_once_after(prefix, 0, response);
        }

        /// Reply once, `delay_ms` after the command is written
        pub fn respond_once_after(&self, prefix: &str, delay_ms: u64, response: &[u8]) {
            self.replies_once.borrow_mut().push(Reply {
                prefix: prefix.into(),
                response: response.to_vec(),
                delay_ms,
            });
        }

        /// Produce `data` on every read, forever
        pub fn set_babble(&self, data: &[u8]) {
            *self.babble.borrow_mut() = Some(data.to_vec());
        }

        /// Bytes emitted when reset is released
        pub fn set_boot_banner(&self, data: &[u8]) {
            *self.boot_banner.borrow_mut() = data.to_vec();
        }

        /// Get all data written via write()
        pub fn get_tx_data(&self) -> Vec<u8> {
            self.tx_buffer.borrow().clone()
        }

        /// Completed command lines, in order
        pub fn commands(&self) -> Vec<String> {
            self.commands.borrow().clone()
        }

        /// Forget recorded commands
        pub fn clear_commands(&self) {
            self.commands.borrow_mut().clear();
        }

        pub fn reset_levels(&self) -> Vec<bool> {
            self.reset_levels.borrow().clone()
        }

        pub fn delay_calls(&self) -> u32 {
            *self.delay_calls.borrow()
        }

        pub fn read_calls(&self) -> u32 {
            *self.read_calls.borrow()
        }

        pub fn now(&self) -> u64 {
            *self.now_ms.borrow()
        }

        /// Check if the transport has been initialised
        pub fn is_initialised(&self) -> bool {
            *self.initialised.borrow()
        }

        /// Set an error to be returned by the next read() call
        pub fn set_next_read_error(&self, error: TransportError) {
            *self.next_read_error.borrow_mut() = Some(error);
        }

        /// Set an error to be returned by the next write() call
        pub fn set_next_write_error(&self, error: TransportError) {
            *self.next_write_error.borrow_mut() = Some(error);
        }

        /// Set an error to be returned by the next reset() call
        pub fn set_next_reset_error(&self, error: TransportError) {
            *self.next_reset_error.borrow_mut() = Some(error);
        }

        fn complete_line(&self, line: String) {
            let mut once = self.replies_once.borrow_mut();
            let reply = match once.iter().position(|r| line.starts_with(&r.prefix)) {
                Some(index) => Some(once.remove(index)),
                None => self
                    .replies
                    .borrow()
                    .iter()
                    .rev()
                    .find(|r| line.starts_with(&r.prefix))
                    .map(|r| Reply {
                        prefix: r.prefix.clone(),
                        response: r.response.clone(),
                        delay_ms: r.delay_ms,
                    }),
            };
            drop(once);

            if let Some(reply) = reply {
                let at = *self.now_ms.borrow() + reply.delay_ms;
                self.queue_rx_data_at(at, &reply.response);
            }
            self.commands.borrow_mut().push(line);
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ModemTransport for MockTransport {
        async fn init(&mut self) -> Result<(), TransportError> {
            *self.initialised.borrow_mut() = true;
            Ok(())
        }

        async fn deinit(&mut self) -> Result<(), TransportError> {
            *self.initialised.borrow_mut() = false;
            Ok(())
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
            if let Some(error) = self.next_write_error.borrow_mut().take() {
                return Err(error);
            }

            self.tx_buffer.borrow_mut().extend_from_slice(data);

            for &byte in data {
                if byte == b'\r' {
                    let line = core::mem::take(&mut *self.pending_line.borrow_mut());
                    self.complete_line(String::from_utf8_lossy(&line).into_owned());
                } else {
                    self.pending_line.borrow_mut().push(byte);
                }
            }

            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            *self.read_calls.borrow_mut() += 1;
            if let Some(error) = self.next_read_error.borrow_mut().take() {
                return Err(error);
            }

            let now = *self.now_ms.borrow();
            let mut rx = self.rx_queue.borrow_mut();
            let mut count = 0;
            while count < buf.len() {
                match rx.front() {
                    Some(&(at, byte)) if at <= now => {
                        buf[count] = byte;
                        count += 1;
                        rx.pop_front();
                    }
                    _ => break,
                }
            }

            if let Some(babble) = self.babble.borrow().as_ref() {
                for &byte in babble {
                    if count >= buf.len() {
                        break;
                    }
                    buf[count] = byte;
                    count += 1;
                }
            }

            Ok(count)
        }

        async fn reset(&mut self, level: bool) -> Result<(), TransportError> {
            if let Some(error) = self.next_reset_error.borrow_mut().take() {
                return Err(error);
            }

            self.reset_levels.borrow_mut().push(level);
            if level {
                let banner = self.boot_banner.borrow().clone();
                self.queue_rx_data(&banner);
            }
            Ok(())
        }

        fn now_ms(&self) -> u64 {
            *self.now_ms.borrow()
        }

        async fn delay_ms(&mut self, ms: u32) {
            *self.now_ms.borrow_mut() += ms as u64;
            *self.delay_calls.borrow_mut() += 1;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mock_scripted_reply() {
            let mut transport = MockTransport::new();
            transport.respond("AT+DR=?", b"\r\n4\r\n\r\nOK\r\n");

            futures::executor::block_on(async {
                transport.write(b"AT+DR=?\r").await.unwrap();

                let mut buf = [0u8; 32];
                let count = transport.read(&mut buf).await.unwrap();
                assert_eq!(&buf[..count], b"\r\n4\r\n\r\nOK\r\n");
                assert_eq!(transport.commands(), vec!["AT+DR=?".to_string()]);
            });
        }

        #[test]
        fn test_mock_delayed_reply() {
            let mut transport = MockTransport::new();
            transport.respond_once_after("AT", 50, b"\r\nOK\r\n");

            futures::executor::block_on(async {
                transport.write(b"AT\r").await.unwrap();

                let mut buf = [0u8; 32];
                assert_eq!(transport.read(&mut buf).await.unwrap(), 0);

                transport.delay_ms(50).await;
                assert_eq!(transport.read(&mut buf).await.unwrap(), 6);
                assert_eq!(transport.now_ms(), 50);
            });
        }

        #[test]
        fn test_mock_partial_read() {
            let mut transport = MockTransport::new();

            futures::executor::block_on(async {
                transport.queue_rx_data(&[0x01, 0x02, 0x03, 0x04, 0x05]);

                let mut buf = [0u8; 2];
                assert_eq!(transport.read(&mut buf).await.unwrap(), 2);
                assert_eq!(&buf, &[0x01, 0x02]);

                let mut buf = [0u8; 10];
                assert_eq!(transport.read(&mut buf).await.unwrap(), 3);
                assert_eq!(&buf[..3], &[0x03, 0x04, 0x05]);
            });
        }

        #[test]
        fn test_mock_write_error() {
            let mut transport = MockTransport::new();

            futures::executor::block_on(async {
                transport.set_next_write_error(TransportError::WriteFailed);
                assert_eq!(transport.write(b"AT\r").await, Err(TransportError::WriteFailed));

                // Error should be cleared
                transport.write(b"AT\r").await.unwrap();
                assert_eq!(transport.commands().len(), 1);
            });
        }

        #[test]
        fn test_mock_boot_banner_on_reset_release() {
            let mut transport = MockTransport::new();
            transport.set_boot_banner(b"\r\nAPP_VERSION: V1.3.0\r\n");

            futures::executor::block_on(async {
                transport.reset(false).await.unwrap();
                transport.reset(true).await.unwrap();

                let mut buf = [0u8; 64];
                let count = transport.read(&mut buf).await.unwrap();
                assert!(count > 0);
                assert_eq!(transport.reset_levels(), vec![false, true]);
            });
        }
    }
}
