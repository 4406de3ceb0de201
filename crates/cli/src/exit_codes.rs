//! CLI Exit Code Registry
//!
//! Single source of truth for xwalk exit codes. Exit codes are part of the
//! shell contract — scripts rely on them.

use crate::client::ClientError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// The server rejected the token.
pub const EXIT_AUTH: u8 = 4;

/// Could not reach the server.
pub const EXIT_CONNECT: u8 = 5;

/// Map a client error to its exit code.
pub fn client_exit_code(err: &ClientError) -> u8 {
    match err {
        ClientError::ConnectionFailed(_) => EXIT_CONNECT,
        ClientError::AuthFailed(_) => EXIT_AUTH,
        ClientError::Protocol(_) | ClientError::Remote { .. } => EXIT_ERROR,
    }
}
