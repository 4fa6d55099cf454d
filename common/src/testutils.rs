//! In-memory stand-in for the gateway, used by the cycle and matrix tests.

use anyhow::{Context, anyhow};

use crate::credential::Credential;
use crate::listing::Listing;
use crate::protocol::Protocol;
use crate::transport::{FailureMode, Operation, Request, Transport};

#[derive(Clone, Debug)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct State {
    // keys are absolute paths without a trailing `/`, the root is ""
    nodes: std::collections::BTreeMap<String, Node>,
    read_only: bool,
    fail_on: Option<String>,
    zero_length_scp: bool,
    rejected_keys: Vec<std::path::PathBuf>,
    password: Option<(String, String)>,
    calls: Vec<String>,
}

/// Directory tree answering [`Request`]s the way the gateway does
#[derive(Debug, Default)]
pub struct FakeServer {
    state: std::sync::Mutex<State>,
}

fn normalize(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

fn join(dir: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        normalize(relative)
    } else {
        format!("{}/{}", normalize(dir), normalize(relative))
    }
}

fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

impl State {
    fn insert_dir_all(&mut self, path: &str) {
        let mut current = String::new();
        self.nodes.insert(current.clone(), Node::Dir);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{current}/{segment}");
            self.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir))
    }

    fn children(&self, dir: &str) -> Vec<(&str, &Node)> {
        let prefix = format!("{dir}/");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, node)| (&key[prefix.len()..], node))
            .collect()
    }

    fn render(&self, dir: &str, protocol: Protocol) -> anyhow::Result<Listing> {
        if !self.is_dir(dir) {
            return Err(anyhow!("no such directory: {:?}", dir));
        }
        let eol = match protocol {
            Protocol::SecureFileTransfer => "\n",
            Protocol::PlainFileTransfer => "\r\n",
        };
        let text: String = self
            .children(dir)
            .into_iter()
            .map(|(entry, node)| match node {
                Node::Dir => format!("drwxrwx--- 1 user group 4096 Jan 01 00:00 {entry}{eol}"),
                Node::File(content) => format!(
                    "-rw-rw---- 1 user group {} Jan 01 00:00 {entry}{eol}",
                    content.len()
                ),
            })
            .collect();
        Ok(Listing::from(text.as_str()))
    }

    fn mkdir(&mut self, path: &str) -> anyhow::Result<()> {
        if !self.is_dir(parent(path)) {
            return Err(anyhow!("parent of {:?} does not exist", path));
        }
        if self.nodes.contains_key(path) {
            return Err(anyhow!("{:?} already exists", path));
        }
        self.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> anyhow::Result<()> {
        if !self.is_dir(path) {
            return Err(anyhow!("{:?} is not a directory", path));
        }
        if !self.children(path).is_empty() {
            return Err(anyhow!("{:?} is not empty", path));
        }
        self.nodes.remove(path);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> anyhow::Result<()> {
        match self.nodes.get(path) {
            Some(Node::File(_)) => {
                self.nodes.remove(path);
                Ok(())
            }
            _ => Err(anyhow!("{:?} is not a file", path)),
        }
    }

    fn rename(&mut self, from: &str, to: &str) -> anyhow::Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(anyhow!("{:?} does not exist", from));
        }
        if self.nodes.contains_key(to) {
            return Err(anyhow!("{:?} already exists", to));
        }
        let prefix = format!("{from}/");
        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| *key == from || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = self.nodes.remove(&key) {
                self.nodes.insert(format!("{to}{}", &key[from.len()..]), node);
            }
        }
        Ok(())
    }

    fn apply(&mut self, dir: &str, command: &str, pending_from: &mut Option<String>) -> anyhow::Result<()> {
        let (verb, args) = command.split_once(' ').unwrap_or((command, ""));
        match verb {
            "MKDIR" | "MKD" => self.mkdir(&join(dir, args)),
            "RMDIR" | "RMD" => self.rmdir(&join(dir, args)),
            "RM" | "DELE" => self.delete(&join(dir, args)),
            "RENAME" => {
                let (from, to) = args
                    .split_once(' ')
                    .with_context(|| format!("malformed rename {:?}", command))?;
                self.rename(&join(dir, from), &join(dir, to))
            }
            "RNFR" => {
                *pending_from = Some(join(dir, args));
                Ok(())
            }
            "RNTO" => {
                let from = pending_from
                    .take()
                    .with_context(|| format!("{:?} without RNFR", command))?;
                self.rename(&from, &join(dir, args))
            }
            _ => Err(anyhow!("unknown command {:?}", command)),
        }
    }

    fn authenticate(&self, request: &Request) -> anyhow::Result<()> {
        match (&request.credential, request.endpoint.protocol) {
            (Credential::Key(key), Protocol::SecureFileTransfer) => {
                if self.rejected_keys.contains(key) {
                    return Err(anyhow!("key {:?} rejected", key));
                }
                Ok(())
            }
            (Credential::Key(_), Protocol::PlainFileTransfer) => {
                Err(anyhow!("plain transfer does not take keys"))
            }
            (Credential::Password { user, password }, _) => match &self.password {
                Some((expected_user, expected_password))
                    if expected_user == user && expected_password == password =>
                {
                    Ok(())
                }
                _ => Err(anyhow!("bad password for {}", user)),
            },
        }
    }

    fn is_mutation(operation: &Operation) -> bool {
        matches!(
            operation,
            Operation::Quote(_) | Operation::Upload { .. } | Operation::ScpUpload { .. }
        )
    }

    fn handle(&mut self, request: &Request, upload: Option<Vec<u8>>) -> anyhow::Result<(Listing, Option<Vec<u8>>)> {
        self.authenticate(request)?;
        let path = normalize(&request.path);
        if self
            .fail_on
            .as_deref()
            .is_some_and(|fail_on| path.starts_with(fail_on))
        {
            return Err(anyhow!("connection reset on {:?}", path));
        }
        if self.read_only && Self::is_mutation(&request.operation) {
            return Err(anyhow!("read-only filesystem"));
        }
        let protocol = request.endpoint.protocol;
        match &request.operation {
            Operation::List => Ok((self.render(&path, protocol)?, None)),
            Operation::Quote(commands) => {
                let mut pending_from = None;
                for command in commands {
                    for rendered in command.render(protocol) {
                        self.apply(&path, &rendered, &mut pending_from)?;
                    }
                }
                Ok((self.render(&path, protocol)?, None))
            }
            Operation::Upload { local } | Operation::ScpUpload { local } => {
                let file_name = local
                    .file_name()
                    .and_then(|name| name.to_str())
                    .with_context(|| format!("bad local file {:?}", local))?;
                let target = if self.is_dir(&path) {
                    join(&path, file_name)
                } else {
                    path.clone()
                };
                if !self.is_dir(parent(&target)) {
                    return Err(anyhow!("no such directory: {:?}", parent(&target)));
                }
                let mut content = upload.unwrap_or_default();
                if self.zero_length_scp && matches!(request.operation, Operation::ScpUpload { .. }) {
                    content.clear();
                }
                self.nodes.insert(target, Node::File(content));
                Ok((Listing::empty(), None))
            }
            Operation::Download { .. } | Operation::ScpDownload { .. } => match self.nodes.get(&path) {
                Some(Node::File(content)) => Ok((Listing::empty(), Some(content.clone()))),
                _ => Err(anyhow!("no such file: {:?}", path)),
            },
        }
    }
}

impl FakeServer {
    /// Server accepting every key and `user`/`test`
    #[must_use]
    pub fn new() -> Self {
        let server = Self::default();
        server.with_state(|state| {
            state.password = Some(("user".to_string(), "test".to_string()));
            state.insert_dir_all("/");
        });
        server
    }

    fn with_state<R>(&self, func: impl FnOnce(&mut State) -> R) -> R {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        func(&mut *state)
    }

    /// Seeds a home directory: `Android`, `DCIM` and `test-dir/sub-dir/<file>`
    #[must_use]
    pub fn with_home(self, base_path: &str, file_name: &str, content: &[u8]) -> Self {
        self.with_state(|state| {
            let home = normalize(base_path);
            state.insert_dir_all(&format!("{home}/Android"));
            state.insert_dir_all(&format!("{home}/DCIM"));
            state.insert_dir_all(&format!("{home}/test-dir/sub-dir"));
            state.nodes.insert(
                format!("{home}/test-dir/sub-dir/{file_name}"),
                Node::File(content.to_vec()),
            );
        });
        self
    }

    #[must_use]
    pub fn with_dir(self, path: &str) -> Self {
        self.with_state(|state| state.insert_dir_all(path));
        self
    }

    #[must_use]
    pub fn read_only(self) -> Self {
        self.with_state(|state| state.read_only = true);
        self
    }

    /// Every request below `path` fails like a dropped connection
    #[must_use]
    pub fn fail_on(self, path: &str) -> Self {
        self.with_state(|state| state.fail_on = Some(normalize(path)));
        self
    }

    /// Secure-copy uploads store zero-length files
    #[must_use]
    pub fn zero_length_scp(self) -> Self {
        self.with_state(|state| state.zero_length_scp = true);
        self
    }

    #[must_use]
    pub fn reject_key(self, key: &std::path::Path) -> Self {
        self.with_state(|state| state.rejected_keys.push(key.to_path_buf()));
        self
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.with_state(|state| state.nodes.contains_key(&normalize(path)))
    }

    /// Every request seen so far, rendered as `<protocol> <operation> <path>`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }

    /// Whether any request tried to change the tree
    #[must_use]
    pub fn saw_mutation(&self) -> bool {
        self.calls()
            .iter()
            .any(|call| call.contains(" quote ") || call.contains(" upload "))
    }
}

fn describe(request: &Request) -> String {
    let operation = match &request.operation {
        Operation::List => "list",
        Operation::Quote(_) => "quote",
        Operation::Upload { .. } | Operation::ScpUpload { .. } => "upload",
        Operation::Download { .. } | Operation::ScpDownload { .. } => "download",
    };
    let transport = match request.operation {
        Operation::ScpUpload { .. } | Operation::ScpDownload { .. } => "scp",
        _ => request.endpoint.protocol.tag(),
    };
    format!("{transport} {operation} {}", request.path)
}

impl Transport for FakeServer {
    async fn execute(&self, request: &Request) -> anyhow::Result<Listing> {
        let upload = match &request.operation {
            Operation::Upload { local } | Operation::ScpUpload { local } => Some(
                tokio::fs::read(local)
                    .await
                    .with_context(|| format!("cannot read {:?}", local))?,
            ),
            _ => None,
        };
        let result = self.with_state(|state| {
            state.calls.push(describe(request));
            state.handle(request, upload)
        });
        let (listing, download) = match result {
            Ok(outcome) => outcome,
            Err(error) if request.mode == FailureMode::Tolerant => {
                tracing::info!("fake server failure tolerated: {:#}", error);
                return Ok(Listing::empty());
            }
            Err(error) => return Err(error.context(format!("{} failed", request.url()))),
        };
        if let (
            Some(content),
            Operation::Download { local } | Operation::ScpDownload { local },
        ) = (download, &request.operation)
        {
            tokio::fs::write(local, content)
                .await
                .with_context(|| format!("cannot write {:?}", local))?;
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Endpoint, RemoteCommand};

    fn sftp() -> Endpoint {
        Endpoint {
            protocol: Protocol::SecureFileTransfer,
            host: "localhost".into(),
            port: 1234,
        }
    }

    #[tokio::test]
    async fn rename_moves_subtree() -> Result<(), anyhow::Error> {
        let server = FakeServer::new().with_home("/", "testfile", b"abc");
        let key = Credential::Key("k".into());
        let request = Request::new(
            &sftp(),
            "/",
            &key,
            Operation::Quote(vec![RemoteCommand::Rename {
                from: "test-dir".into(),
                to: "moved".into(),
            }]),
        );
        let listing = server.execute(&request).await?;
        assert!(listing.entry_names().any(|name| name == "moved"));
        assert!(server.exists("/moved/sub-dir/testfile"));
        assert!(!server.exists("/test-dir"));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_key_is_tolerated_only_on_request() -> Result<(), anyhow::Error> {
        let server = FakeServer::new()
            .with_home("/", "testfile", b"abc")
            .reject_key(std::path::Path::new("bad"));
        let bad = Credential::Key("bad".into());
        let request = Request::new(&sftp(), "/", &bad, Operation::List);
        assert!(server.execute(&request).await.is_err());
        assert!(server.execute(&request.tolerant()).await?.is_empty());
        Ok(())
    }
}
