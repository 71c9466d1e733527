use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;

/// A program invocation kept as discrete arguments.
///
/// Backends that need a single string get it from [`CommandLine::render`],
/// which quotes every argument that is not made of shell-safe characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends `flag value`.
    pub fn option(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '@' | '%' | '+')
}

/// POSIX single-quote escaping.
fn shell_quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return Cow::Borrowed(arg);
    }
    Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
}

/// Which of the two database daemons a node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Shard,
    Config,
}

impl ServerRole {
    pub fn flag(&self) -> &'static str {
        match self {
            ServerRole::Shard => "--shardsvr",
            ServerRole::Config => "--configsvr",
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Shard => write!(f, "shard"),
            ServerRole::Config => write!(f, "config"),
        }
    }
}

/// Parameters of one database server daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLaunch<'a> {
    pub role: ServerRole,
    pub replica_set: &'a str,
    pub db_path: &'a str,
    /// Address bound next to `localhost`.
    pub bind_address: IpAddr,
    pub port: u16,
    pub log_path: &'a str,
}

impl ServerLaunch<'_> {
    pub fn command(&self, binary: &str) -> CommandLine {
        CommandLine::new(binary)
            .arg(self.role.flag())
            .option("--replSet", self.replica_set)
            .option("--dbpath", self.db_path)
            .option("--bind_ip", format!("localhost,{}", self.bind_address))
            .option("--port", self.port.to_string())
            .option("--logpath", self.log_path)
    }
}

/// Runs a script file through the database shell against a local port.
pub fn shell_script_command(shell_binary: &str, port: u16, script_path: &str) -> CommandLine {
    CommandLine::new(shell_binary)
        .option("--port", port.to_string())
        .arg(script_path)
}
