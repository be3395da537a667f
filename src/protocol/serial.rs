use crate::prelude::*;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MAX_RESPONSE: usize = 512;

/// CRC16/XMODEM as PI30 devices expect it: any CRC byte that would collide
/// with a frame marker (`(`, CR, LF) is bumped by one.
pub fn crc(data: &[u8]) -> [u8; 2] {
    let mut r = crc16::State::<crc16::XMODEM>::calculate(data).to_be_bytes();
    for b in r.iter_mut() {
        if matches!(*b, 0x28 | 0x0d | 0x0a) {
            *b += 1;
        }
    }
    r
}

pub fn frame(command: &str) -> Vec<u8> {
    let mut r = BytesMut::with_capacity(command.len() + 3);
    r.put_slice(command.as_bytes());
    r.put_slice(&crc(command.as_bytes()));
    r.put_u8(b'\r');
    r.to_vec()
}

/// Check a `(<payload><crc>\r` response and return the payload.
pub fn unframe(response: &[u8]) -> Result<String> {
    let body = response.strip_suffix(b"\r").unwrap_or(response);
    if body.len() < 3 {
        return Err(file_error!("response too short ({} bytes)", response.len()));
    }

    let (data, check) = body.split_at(body.len() - 2);
    if crc(data) != check {
        return Err(file_error!(
            "CRC mismatch: got {:02X?}, expected {:02X?}",
            check,
            crc(data)
        ));
    }

    let data = data
        .strip_prefix(b"(")
        .ok_or_else(|| file_error!("response does not start with '('"))?;

    String::from_utf8(data.to_vec())
        .map_err(|err| file_error_with_source!(err, "response is not text"))
}

/// In-process PI30 transport over a serial port.
pub struct SerialPi30 {
    port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
    dialect: Dialect,
}

impl SerialPi30 {
    pub fn open(path: &str, baudrate: u32, timeout: Duration, dialect: Dialect) -> Result<Self> {
        let port = serialport::new(path, baudrate)
            .timeout(timeout)
            .open()
            .map_err(|err| file_error_with_source!(err, "opening {}", path))?;

        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            dialect,
        })
    }

    fn transact(port: &Mutex<Box<dyn serialport::SerialPort>>, request: &[u8]) -> Result<Vec<u8>> {
        let mut port = port
            .lock()
            .map_err(|_| anyhow!("serial port lock poisoned"))?;

        port.clear(serialport::ClearBuffer::Input)?;
        port.write_all(request)?;
        port.flush()?;

        let mut response = Vec::with_capacity(128);
        let mut buffer = [0u8; 64];
        while !response.ends_with(b"\r") {
            let n = port.read(&mut buffer)?;
            if n == 0 {
                bail!("no response received");
            }
            response.extend_from_slice(&buffer[..n]);
            if response.len() > MAX_RESPONSE {
                bail!("response exceeds {} bytes without terminator", MAX_RESPONSE);
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl Protocol for SerialPi30 {
    async fn execute(&mut self, command: &str) -> Result<Reading> {
        let request = frame(command);
        debug!("TX {}: {:02X?}", command, request);

        let port = self.port.clone();
        let response = tokio::task::spawn_blocking(move || Self::transact(&port, &request))
            .await??;
        debug!("RX {}: {:02X?}", command, response);

        let payload = unframe(&response)?;
        self.dialect.decode(command, &payload)
    }
}
