// coolcache: interactive client shell for the CoolCache server.
//
// The shell is a thin collaborator of the server core: it frames typed
// lines as RESP commands, prints decoded replies, and knows nothing about
// command semantics.

pub mod shell;

pub use shell::{ShellClient, format_reply};
