//! Command table and dispatcher.

use crate::runtime::{ShutdownFlag, ShutdownReason};
use std::collections::HashMap;

/// Response line written by `DIR`.
pub const DIR_RESPONSE: &str = "Directory...";

/// State a command may touch while it runs.
pub struct CommandContext<'a> {
    /// Connection the line arrived on.
    pub conn_id: u64,
    /// Text sent back to the client once the whole line is dispatched.
    pub response: String,
    pub shutdown: &'a ShutdownFlag,
}

impl<'a> CommandContext<'a> {
    pub fn new(conn_id: u64, shutdown: &'a ShutdownFlag) -> Self {
        Self {
            conn_id,
            response: String::new(),
            shutdown,
        }
    }

    /// Append one `\r\n`-terminated line to the response.
    pub fn write_line(&mut self, line: &str) {
        self.response.push_str(line);
        self.response.push_str("\r\n");
    }
}

pub type CommandFn = fn(&mut CommandContext<'_>);

/// Upper-cased token to action. Built once, shared read-only by every
/// connection.
pub struct CommandTable {
    commands: HashMap<&'static str, CommandFn>,
}

impl CommandTable {
    /// Table holding the built-in `EX` and `DIR` commands.
    pub fn builtin() -> Self {
        let mut commands: HashMap<&'static str, CommandFn> = HashMap::new();
        commands.insert("EX", ex);
        commands.insert("DIR", dir);
        Self { commands }
    }

    pub fn get(&self, token: &str) -> Option<CommandFn> {
        self.commands.get(token).copied()
    }

    /// Run every recognised token of `line`, left to right.
    ///
    /// Unknown tokens are ignored. Returns the number of commands executed.
    pub fn dispatch(&self, line: &str, ctx: &mut CommandContext<'_>) -> usize {
        let mut executed = 0;
        for token in line.split_whitespace() {
            if let Some(command) = self.get(&token.to_ascii_uppercase()) {
                command(ctx);
                executed += 1;
            }
        }
        executed
    }
}

fn ex(ctx: &mut CommandContext<'_>) {
    ctx.shutdown.trigger(ShutdownReason::StopCommand {
        conn_id: ctx.conn_id,
    });
}

fn dir(ctx: &mut CommandContext<'_>) {
    ctx.write_line(DIR_RESPONSE);
}
