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

use anyhow::Result;
use clap::Args;
use codeatlas::indexer;
use std::io::{self, Write};
use std::path::Path;

#[derive(Args)]
pub struct ClearArgs {
	/// Skip the confirmation prompt
	#[arg(long)]
	pub yes: bool,
}

pub fn execute(project_dir: &Path, args: &ClearArgs) -> Result<()> {
	if !args.yes {
		print!("Remove all index data for this project? [y/N] ");
		io::stdout().flush()?;
		let mut answer = String::new();
		io::stdin().read_line(&mut answer)?;
		if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
			println!("Aborted.");
			return Ok(());
		}
	}

	indexer::clear(project_dir)?;
	println!("Index data removed.");
	Ok(())
}
