//! The RMCP+ session establishment payloads.

mod rakp;
pub use rakp::RakpStatusCode;

mod open_session;
pub use open_session::{
    AlgorithmPayloadError, OpenSessionRequest, OpenSessionResponse, ParseOpenSessionRequestError,
    ParseOpenSessionResponseError,
};

mod rakp_1;
pub use rakp_1::{RakpMessage1, Username};

mod rakp_2;
pub use rakp_2::{ParseError as RakpMessage2ParseError, RakpMessage2};

mod rakp_3;
pub use rakp_3::{ParseError as RakpMessage3ParseError, RakpMessage3};

mod rakp_4;
pub use rakp_4::{ParseError as RakpMessage4ParseError, RakpMessage4};
