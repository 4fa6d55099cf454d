/// Network protocol used for listings and remote commands
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// SFTP
    SecureFileTransfer,
    /// FTP
    PlainFileTransfer,
}

impl Protocol {
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::SecureFileTransfer => "sftp",
            Protocol::PlainFileTransfer => "ftp",
        }
    }

    /// Short tag used in discrepancy labels
    #[must_use]
    pub fn tag(self) -> &'static str {
        self.scheme()
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// A filesystem mutation issued as a remote sub-protocol command.
///
/// Paths are relative to the URL the command is sent against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCommand {
    Mkdir(String),
    Rmdir(String),
    Delete(String),
    Rename { from: String, to: String },
}

impl RemoteCommand {
    /// Renders the verbatim command strings for the given protocol.
    ///
    /// A rename over plain FTP needs two commands (`RNFR` followed by `RNTO`),
    /// everything else maps to exactly one.
    #[must_use]
    pub fn render(&self, protocol: Protocol) -> Vec<String> {
        match (self, protocol) {
            (RemoteCommand::Mkdir(path), Protocol::SecureFileTransfer) => {
                vec![format!("MKDIR {path}")]
            }
            (RemoteCommand::Mkdir(path), Protocol::PlainFileTransfer) => {
                vec![format!("MKD {path}")]
            }
            (RemoteCommand::Rmdir(path), Protocol::SecureFileTransfer) => {
                vec![format!("RMDIR {path}")]
            }
            (RemoteCommand::Rmdir(path), Protocol::PlainFileTransfer) => {
                vec![format!("RMD {path}")]
            }
            (RemoteCommand::Delete(path), Protocol::SecureFileTransfer) => {
                vec![format!("RM {path}")]
            }
            (RemoteCommand::Delete(path), Protocol::PlainFileTransfer) => {
                vec![format!("DELE {path}")]
            }
            (RemoteCommand::Rename { from, to }, Protocol::SecureFileTransfer) => {
                vec![format!("RENAME {from} {to}")]
            }
            (RemoteCommand::Rename { from, to }, Protocol::PlainFileTransfer) => {
                vec![format!("RNFR {from}"), format!("RNTO {to}")]
            }
        }
    }
}

/// Host and port a request is sent to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Base address, e.g. `sftp://localhost:1234`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Full URL for an absolute remote path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}
