// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};

use crate::config::project_data_dir;

/// File-based lock enforcing single-flight index builds per project.
pub struct BuildLock {
	lock_file: PathBuf,
	acquired: bool,
}

impl BuildLock {
	pub fn new(project_dir: &Path) -> Self {
		Self {
			lock_file: project_data_dir(project_dir).join("build.lock"),
			acquired: false,
		}
	}

	/// Try to acquire the lock without waiting. Returns false when another
	/// live process holds it.
	pub fn try_acquire(&mut self) -> io::Result<bool> {
		if let Some(parent) = self.lock_file.parent() {
			fs::create_dir_all(parent)?;
		}

		let my_pid = process::id();

		match fs::read_to_string(&self.lock_file) {
			Ok(contents) => {
				if let Ok(pid) = contents.trim().parse::<u32>() {
					if pid == my_pid {
						self.acquired = true;
						return Ok(true);
					}
					if Self::is_process_alive(pid) {
						debug!("Build lock held by live PID {}", pid);
						return Ok(false);
					}
					// Holder died without releasing, reclaim
					debug!("Cleaning stale build lock from dead PID {}", pid);
					let _ = fs::remove_file(&self.lock_file);
				} else {
					warn!("Invalid build lock content, removing");
					let _ = fs::remove_file(&self.lock_file);
				}
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => return Err(e),
		}

		match fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&self.lock_file)
		{
			Ok(mut file) => {
				file.write_all(my_pid.to_string().as_bytes())?;
				file.sync_all()?;
				self.acquired = true;
				debug!("Acquired build lock (PID {})", my_pid);
				Ok(true)
			}
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Whether this instance currently holds the lock.
	pub fn is_held(&self) -> bool {
		self.acquired
	}

	/// True when some live process (possibly this one) holds the lock.
	pub fn is_locked(project_dir: &Path) -> bool {
		let lock_file = project_data_dir(project_dir).join("build.lock");
		match fs::read_to_string(&lock_file) {
			Ok(contents) => contents
				.trim()
				.parse::<u32>()
				.map(Self::is_process_alive)
				.unwrap_or(false),
			Err(_) => false,
		}
	}

	pub fn release(&mut self) -> io::Result<()> {
		if self.acquired {
			match fs::remove_file(&self.lock_file) {
				Ok(_) => {
					self.acquired = false;
					debug!("Released build lock");
					Ok(())
				}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					self.acquired = false;
					Ok(())
				}
				Err(e) => Err(e),
			}
		} else {
			Ok(())
		}
	}

	#[cfg(unix)]
	fn is_process_alive(pid: u32) -> bool {
		// kill -0 doesn't send a signal, it only checks existence
		use std::process::Command;

		Command::new("kill")
			.args(["-0", &pid.to_string()])
			.output()
			.map(|output| output.status.success())
			.unwrap_or(false)
	}

	#[cfg(windows)]
	fn is_process_alive(pid: u32) -> bool {
		use std::process::Command;

		Command::new("tasklist")
			.args(&["/FI", &format!("PID eq {}", pid)])
			.output()
			.map(|output| {
				let output_str = String::from_utf8_lossy(&output.stdout);
				output_str.contains(&pid.to_string())
			})
			.unwrap_or(false)
	}

	#[cfg(not(any(unix, windows)))]
	fn is_process_alive(_pid: u32) -> bool {
		true
	}
}

impl Drop for BuildLock {
	fn drop(&mut self) {
		let _ = self.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn temp_project() -> PathBuf {
		let dir = std::env::temp_dir().join(format!(
			"codeatlas-lock-test-{}-{}",
			process::id(),
			chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
		));
		fs::create_dir_all(&dir).unwrap();
		dir
	}

	#[test]
	fn acquire_and_release() {
		let project = temp_project();
		let mut lock = BuildLock::new(&project);
		assert!(lock.try_acquire().unwrap());
		assert!(lock.is_held());
		assert!(BuildLock::is_locked(&project));

		lock.release().unwrap();
		assert!(!lock.is_held());
		assert!(!BuildLock::is_locked(&project));
		let _ = fs::remove_dir_all(&project);
	}

	#[test]
	fn reacquire_by_same_process_succeeds() {
		let project = temp_project();
		let mut first = BuildLock::new(&project);
		assert!(first.try_acquire().unwrap());

		// Same PID owns the file, so a second handle also succeeds
		let mut second = BuildLock::new(&project);
		assert!(second.try_acquire().unwrap());

		let _ = fs::remove_dir_all(&project);
	}

	#[test]
	fn stale_lock_is_reclaimed() {
		let project = temp_project();
		let lock_file = project_data_dir(&project).join("build.lock");
		fs::create_dir_all(lock_file.parent().unwrap()).unwrap();
		// PID 1 on unix is init and never our process; u32::MAX is never valid
		fs::write(&lock_file, "4294967294").unwrap();

		let mut lock = BuildLock::new(&project);
		assert!(lock.try_acquire().unwrap());
		let _ = fs::remove_dir_all(&project);
	}

	#[test]
	fn garbage_lock_content_is_removed() {
		let project = temp_project();
		let lock_file = project_data_dir(&project).join("build.lock");
		fs::create_dir_all(lock_file.parent().unwrap()).unwrap();
		fs::write(&lock_file, "not-a-pid").unwrap();

		let mut lock = BuildLock::new(&project);
		assert!(lock.try_acquire().unwrap());
		let _ = fs::remove_dir_all(&project);
	}
}
