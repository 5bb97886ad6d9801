use super::{Command, NetFn, Operation};

/// The Close Session command.
///
/// Carries the managed system session ID of the session to tear down.
pub struct CloseSession {
    pub session_id: u32,
}

impl Command for CloseSession {
    type Output = ();

    type Error = core::convert::Infallible;

    fn name(&self) -> &'static str {
        "Close Session"
    }

    fn operation(&self) -> Operation {
        Operation::new(NetFn::App, 0x3C)
    }

    fn write_request(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.session_id.to_le_bytes());
    }

    fn parse_response(&self, _data: &[u8]) -> Result<Self::Output, Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_session_id() {
        let mut buffer = Vec::new();
        CloseSession {
            session_id: 0x02F00A17,
        }
        .write_request(&mut buffer);

        assert_eq!(buffer, [0x17, 0x0A, 0xF0, 0x02]);
    }
}
