//! Draining the usage records that follow a status query.
//!
//! A `REQLIC`/`REQLIC1` exchange reports `used`, and the vendor then sends exactly
//! `used` more `REQLIC2` frames with no further request from us. Modeling that as its
//! own small object, rather than a loop inlined in the connection, keeps the "you must
//! drain before sending the next request" rule local to one place instead of relying on
//! every call site to remember it.

use std::io::Read;

use flexnet_proto::{decode_message, Framed, Message, UsageRecord};

use crate::error::{ClientError, ClientErrorExt, ClientResult};

pub struct StatusQuery<'a, S> {
    framed: &'a mut Framed<S>,
    remaining: u32,
}

impl<'a, S> StatusQuery<'a, S> {
    pub fn new(framed: &'a mut Framed<S>, used: u32) -> Self {
        Self { framed, remaining: used }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl<S> StatusQuery<'_, S>
where
    S: Read,
{
    /// Reads the records left to drain and consumes `self`, so a caller can't
    /// accidentally start a new request while records are still outstanding.
    pub fn drain_all(mut self) -> ClientResult<Vec<UsageRecord>> {
        let mut records = Vec::with_capacity(self.remaining as usize);
        while self.remaining > 0 {
            records.push(self.drain_one()?);
        }
        Ok(records)
    }

    fn drain_one(&mut self) -> ClientResult<UsageRecord> {
        let frame = self.framed.read_frame().map_err(ClientError::decode)?;
        let message = decode_message(&frame).map_err(ClientError::decode)?;
        self.remaining -= 1;
        match message {
            Message::ReqLic2(record) => Ok(record),
            other => Err(ClientError::unexpected_message(
                "status query usage drain",
                "REQLIC2",
            )
            .with_source(UnexpectedUsageFrame(format!("{other:?}")))),
        }
    }
}

#[derive(Debug)]
struct UnexpectedUsageFrame(String);

impl std::fmt::Display for UnexpectedUsageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "got {}", self.0)
    }
}

impl std::error::Error for UnexpectedUsageFrame {}
