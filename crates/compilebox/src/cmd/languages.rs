use clap::Args;

use super::ConfigArgs;
use crate::config;
use crate::error::RunnerResult;
use crate::registry::LanguageRegistry;

#[derive(Args)]
pub struct LanguagesArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

pub async fn run_languages(args: LanguagesArgs) -> RunnerResult<()> {
    let mut config = config::load_or_default(args.config.path()).await?;
    let registry = LanguageRegistry::with_overrides(std::mem::take(&mut config.languages))?;

    println!("{:<14} {:<14} {:<12} TOOLCHAIN", "ID", "NAME", "FILE");
    for (id, spec) in registry.iter() {
        println!(
            "{id:<14} {:<14} {:<12} {}",
            spec.display_name, spec.source_file, spec.toolchain
        );
    }
    Ok(())
}
