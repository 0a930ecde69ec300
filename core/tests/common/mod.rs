#![allow(dead_code)]

use assert_fs::prelude::*;
use kiln_core::events::{Event, EventChannel, EventConsumer};
use kiln_core::{Action, CommandSpec, Config, ConfigBuilder, KilnDrive};
use std::path::PathBuf;
use std::sync::Arc;

/// A scratch workspace with its own kiln root, and a consumer for every event sent while
/// building in it.
pub struct TestWorkspace {
    pub dir: assert_fs::TempDir,
    pub event_channel: Arc<EventChannel>,
    pub events: EventConsumer,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("ws").create_dir_all().unwrap();
        let event_channel = Arc::new(EventChannel::new());
        let events = event_channel.consumer();
        Self {
            dir,
            event_channel,
            events,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    pub fn kiln_root(&self) -> PathBuf {
        self.dir.path().join("kiln")
    }

    pub fn output(&self, path: &str) -> PathBuf {
        self.kiln_root().join("out").join(path)
    }

    pub fn write_source(&self, path: &str, contents: &str) {
        self.dir
            .child("ws")
            .child(path)
            .write_str(contents)
            .unwrap();
    }

    pub fn config(&self) -> ConfigBuilder {
        let mut builder = Config::builder();
        builder
            .workspace_root(self.root())
            .kiln_root(self.kiln_root())
            .max_local_workers(4)
            .event_channel(self.event_channel.clone());
        builder
    }

    pub fn drive(&self) -> KilnDrive {
        KilnDrive::new(self.config().build().unwrap()).unwrap()
    }

    pub fn drain_events(&self) -> Vec<Event> {
        self.events.drain()
    }
}

/// A shell script with a small, predictable `PATH`, since sandboxed actions only see the
/// variables they declare.
pub fn sh(script: &str) -> CommandSpec {
    CommandSpec::shell(script).env("PATH", "/usr/bin:/bin")
}

pub fn action(owner: &str, command: CommandSpec) -> kiln_core::graph::ActionBuilder {
    let mut builder = Action::builder();
    builder.owner(owner).mnemonic("Shell").command(command);
    builder
}

pub fn count<F>(events: &[Event], pred: F) -> usize
where
    F: Fn(&Event) -> bool,
{
    events.iter().filter(|event| pred(event)).count()
}
