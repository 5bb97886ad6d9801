use super::{Command, Operation};

/// An arbitrary command: raw request bytes in, raw response bytes out.
pub struct RawCommand {
    operation: Operation,
    data: Vec<u8>,
}

impl RawCommand {
    pub fn new(operation: Operation, data: Vec<u8>) -> Self {
        Self { operation, data }
    }
}

impl Command for RawCommand {
    type Output = Vec<u8>;

    type Error = core::convert::Infallible;

    fn name(&self) -> &'static str {
        "Raw Command"
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn write_request(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.data);
    }

    fn parse_response(&self, data: &[u8]) -> Result<Self::Output, Self::Error> {
        Ok(data.to_vec())
    }
}
