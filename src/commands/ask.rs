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

use anyhow::{bail, Result};
use clap::Args;
use codeatlas::config::Config;
use codeatlas::query;
use std::path::Path;

#[derive(Args)]
pub struct AskArgs {
	/// The question to answer from the indexed code
	#[arg(required = true, trailing_var_arg = true)]
	pub question: Vec<String>,

	/// Print pipeline diagnostics after the answer
	#[arg(long)]
	pub verbose: bool,
}

pub async fn execute(project_dir: &Path, config: &Config, args: &AskArgs) -> Result<()> {
	let question = args.question.join(" ");
	if question.trim().is_empty() {
		bail!("The question is empty");
	}

	let outcome = query::ask(project_dir, config, &question).await?;

	println!("{}", outcome.answer);

	if args.verbose {
		eprintln!();
		eprintln!("intent: {} (confidence {:.2})", outcome.intent, outcome.confidence);
		eprintln!("rewritten query: {}", outcome.rewritten);
		if let Some(strategy) = outcome.strategy {
			eprintln!("retrieval strategy: {}", strategy.as_str());
		}
		eprintln!(
			"quality: {} (overall {:.2}, relevancy {:.2}, completeness {:.2}, accuracy {:.2})",
			outcome.report.flag.as_str(),
			outcome.report.overall,
			outcome.report.relevancy,
			outcome.report.completeness,
			outcome.report.accuracy
		);
		for recommendation in &outcome.report.recommendations {
			eprintln!("note: {recommendation}");
		}
	}

	Ok(())
}
