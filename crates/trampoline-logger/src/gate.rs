// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The sensitive log gate.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

const PREFIX: &str = "[github-apps-trampoline]";

/// Sink configuration, assembled once from the CLI flags.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
	/// Log file path. The file sink may record sensitive values.
	pub file: Option<PathBuf>,
	/// Verbose mode enables the stderr sink.
	pub verbose: bool,
	/// Tee to stderr even when a log file is configured.
	pub tee_stderr: bool,
}

/// Splits log messages between a secret-capable file sink and a
/// redacted-only stderr sink.
///
/// Writes are best-effort: a failing sink never fails the invocation.
#[derive(Clone)]
pub struct LogGate {
	file: Option<Arc<Mutex<File>>>,
	stderr: bool,
}

impl LogGate {
	/// Open the configured sinks. The log file is opened append-only with
	/// owner-only permissions.
	pub fn new(config: &LogConfig) -> io::Result<Self> {
		let file = match &config.file {
			Some(path) => Some(Arc::new(Mutex::new(open_log_file(path)?))),
			None => None,
		};
		Ok(Self {
			file,
			stderr: config.verbose || config.tee_stderr,
		})
	}

	/// A gate with both sinks disabled.
	pub fn disabled() -> Self {
		Self {
			file: None,
			stderr: false,
		}
	}

	/// Write to the file sink only. The message may contain plaintext
	/// secrets.
	pub fn filef(&self, msg: &str) {
		if let Some(file) = &self.file {
			if let Ok(mut file) = file.lock() {
				let _ = writeln!(file, "{PREFIX} {msg}");
			}
		}
	}

	/// Write to the stderr sink only. The caller supplies already
	/// redacted or fingerprinted text.
	pub fn stderrf(&self, msg: &str) {
		if self.stderr {
			eprintln!("{PREFIX} {msg}");
		}
	}

	pub fn stderr_enabled(&self) -> bool {
		self.stderr
	}

	/// Writer for a `tracing` file layer, sharing the gate's handle so
	/// interleaved lines from both paths stay intact.
	pub fn file_make_writer(&self) -> Option<FileSink> {
		self.file.as_ref().map(|file| FileSink {
			file: Arc::clone(file),
		})
	}
}

fn open_log_file(path: &Path) -> io::Result<File> {
	let mut options = std::fs::OpenOptions::new();
	options.create(true).append(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}
	options.open(path)
}

/// `MakeWriter` over the gate's file handle.
#[derive(Clone)]
pub struct FileSink {
	file: Arc<Mutex<File>>,
}

pub struct FileSinkWriter {
	file: Arc<Mutex<File>>,
}

impl Write for FileSinkWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.file.lock() {
			Ok(mut file) => file.write(buf),
			Err(_) => Ok(buf.len()),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.file.lock() {
			Ok(mut file) => file.flush(),
			Err(_) => Ok(()),
		}
	}
}

impl<'a> MakeWriter<'a> for FileSink {
	type Writer = FileSinkWriter;

	fn make_writer(&'a self) -> Self::Writer {
		FileSinkWriter {
			file: Arc::clone(&self.file),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn gate_with_file(path: &Path) -> LogGate {
		LogGate::new(&LogConfig {
			file: Some(path.to_path_buf()),
			verbose: false,
			tee_stderr: false,
		})
		.unwrap()
	}

	#[test]
	fn test_filef_writes_to_file_sink() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("trampoline.log");
		let gate = gate_with_file(&path);

		gate.filef("token response: secret-value");

		let contents = std::fs::read_to_string(&path).unwrap();
		assert_eq!(
			contents,
			"[github-apps-trampoline] token response: secret-value\n"
		);
	}

	#[test]
	fn test_filef_appends() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("trampoline.log");
		let gate = gate_with_file(&path);

		gate.filef("first");
		gate.filef("second");

		let contents = std::fs::read_to_string(&path).unwrap();
		assert_eq!(contents.lines().count(), 2);
	}

	#[test]
	fn test_disabled_gate_does_not_panic() {
		let gate = LogGate::disabled();
		gate.filef("dropped");
		gate.stderrf("dropped");
		assert!(!gate.stderr_enabled());
		assert!(gate.file_make_writer().is_none());
	}

	#[test]
	fn test_verbose_enables_stderr_sink() {
		let gate = LogGate::new(&LogConfig {
			file: None,
			verbose: true,
			tee_stderr: false,
		})
		.unwrap();
		assert!(gate.stderr_enabled());
	}

	#[test]
	fn test_tee_enables_stderr_sink() {
		let gate = LogGate::new(&LogConfig {
			file: None,
			verbose: false,
			tee_stderr: true,
		})
		.unwrap();
		assert!(gate.stderr_enabled());
	}

	#[test]
	fn test_make_writer_shares_the_file_handle() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("trampoline.log");
		let gate = gate_with_file(&path);

		let sink = gate.file_make_writer().unwrap();
		let mut writer = sink.make_writer();
		writer.write_all(b"from tracing\n").unwrap();
		writer.flush().unwrap();
		gate.filef("from gate");

		let contents = std::fs::read_to_string(&path).unwrap();
		assert!(contents.contains("from tracing"));
		assert!(contents.contains("from gate"));
	}

	#[test]
	#[cfg(unix)]
	fn test_log_file_is_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("trampoline.log");
		let _gate = gate_with_file(&path);

		let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
		assert_eq!(mode, 0o600);
	}
}
