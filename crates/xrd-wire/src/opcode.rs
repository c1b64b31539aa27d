use std::fmt;

use crate::WireError;

/// Request opcodes recognized on the wire, as named in the specification's
/// wire-codec table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Opcode {
    /// `kXR_auth` — continue or start an authentication exchange.
    Auth = 3000,
    /// `kXR_query` — server/file metadata query.
    Query = 3001,
    /// `kXR_chmod` — change permission bits.
    Chmod = 3002,
    /// `kXR_close` — close a previously opened file handle.
    Close = 3003,
    /// `kXR_dirlist` — list a directory's entries.
    Dirlist = 3004,
    /// `kXR_mkdir` — create a directory.
    Mkdir = 3006,
    /// `kXR_mv` — rename/move a path.
    Mv = 3007,
    /// `kXR_open` — open a file, returning a file handle.
    Open = 3008,
    /// `kXR_ping` — liveness check.
    Ping = 3009,
    /// `kXR_read` — read from an open file handle.
    Read = 3010,
    /// `kXR_rm` — remove a file.
    Rm = 3011,
    /// `kXR_rmdir` — remove a directory.
    Rmdir = 3012,
    /// `kXR_sigver` — signed/verified request envelope.
    Sigver = 3013,
    /// `kXR_stat` — stat a path or an open handle.
    Stat = 3014,
    /// `kXR_write` — write to an open file handle.
    Write = 3015,
    /// `kXR_prepare` — stage-ahead hint.
    Prepare = 3017,
    /// `kXR_statx` — bulk stat of multiple paths.
    Statx = 3022,
    /// `kXR_protocol` — protocol/capability negotiation.
    Protocol = 3023,
    /// `kXR_truncate` — truncate or extend a file.
    Truncate = 3027,
    /// `kXR_locate` — locate server(s) hosting a path.
    Locate = 3028,
    /// `kXR_readv` — vectored read across one or more handles.
    Readv = 3029,
    /// `kXR_fattr` — extended attribute get/set/list/delete.
    Fattr = 3031,
    /// `kXR_pgread` — paged read with interleaved CRC32C checksums.
    Pgread = 3032,
    /// `kXR_pgwrite` — paged write with interleaved CRC32C checksums.
    Pgwrite = 3033,
    /// `kXR_bind` — announce a sub-stream binding to an existing session.
    Bind = 3034,
}

impl Opcode {
    /// Decodes a raw 16-bit opcode value.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownOpcode`] for any value not named above.
    pub fn from_u16(value: u16) -> Result<Self, WireError> {
        Ok(match value {
            3000 => Self::Auth,
            3001 => Self::Query,
            3002 => Self::Chmod,
            3003 => Self::Close,
            3004 => Self::Dirlist,
            3006 => Self::Mkdir,
            3007 => Self::Mv,
            3008 => Self::Open,
            3009 => Self::Ping,
            3010 => Self::Read,
            3011 => Self::Rm,
            3012 => Self::Rmdir,
            3013 => Self::Sigver,
            3014 => Self::Stat,
            3015 => Self::Write,
            3017 => Self::Prepare,
            3022 => Self::Statx,
            3023 => Self::Protocol,
            3027 => Self::Truncate,
            3028 => Self::Locate,
            3029 => Self::Readv,
            3031 => Self::Fattr,
            3032 => Self::Pgread,
            3033 => Self::Pgwrite,
            3034 => Self::Bind,
            other => return Err(WireError::UnknownOpcode(other)),
        })
    }

    /// The raw wire value for this opcode.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_known_opcode() {
        let known = [
            Opcode::Auth,
            Opcode::Query,
            Opcode::Chmod,
            Opcode::Close,
            Opcode::Dirlist,
            Opcode::Mkdir,
            Opcode::Mv,
            Opcode::Open,
            Opcode::Ping,
            Opcode::Read,
            Opcode::Rm,
            Opcode::Rmdir,
            Opcode::Sigver,
            Opcode::Stat,
            Opcode::Write,
            Opcode::Prepare,
            Opcode::Statx,
            Opcode::Protocol,
            Opcode::Truncate,
            Opcode::Locate,
            Opcode::Readv,
            Opcode::Fattr,
            Opcode::Pgread,
            Opcode::Pgwrite,
            Opcode::Bind,
        ];
        for op in known {
            assert_eq!(Opcode::from_u16(op.as_u16()).unwrap(), op);
        }
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(matches!(
            Opcode::from_u16(1),
            Err(WireError::UnknownOpcode(1))
        ));
    }
}
