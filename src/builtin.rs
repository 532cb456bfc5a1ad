use crate::SHELL_NAME;
use crate::env::Environment;
use crate::executor::Outcome;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::path::PathBuf;

/// Commands the executor handles itself instead of exec'ing a program.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and run inside
/// the forked process that would otherwise have called `exec`, so their
/// effects end with that process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    const NAME: &'static str;

    fn execute(self, env: &Environment) -> Result<()>;
}

/// Runs `argv` as a builtin if its first word names one.
pub fn try_run(argv: &[String], env: &Environment) -> Option<Outcome> {
    let (name, args) = argv.split_first()?;
    match name.as_str() {
        name if name == Cd::NAME => Some(run::<Cd>(args, env)),
        _ => None,
    }
}

fn run<T: BuiltinCommand>(args: &[String], env: &Environment) -> Outcome {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let command = match T::from_args(&[T::NAME], &args) {
        Ok(command) => command,
        Err(EarlyExit { output, status }) => {
            return match status {
                Ok(()) => {
                    println!("{output}");
                    Outcome::Success
                }
                Err(()) => {
                    eprintln!("{SHELL_NAME}: {output}");
                    Outcome::NonZeroExit
                }
            };
        }
    };
    match command.execute(env) {
        Ok(()) => Outcome::Success,
        Err(e) => {
            eprintln!("{SHELL_NAME}: {}: {e:#}", T::NAME);
            Outcome::NonZeroExit
        }
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, or the target is `~`, changes to $HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl Cd {
    fn destination(&self, env: &Environment) -> Result<PathBuf> {
        match self.target.as_deref() {
            Some(target) if !target.is_empty() && target != "~" => Ok(PathBuf::from(target)),
            _ => env
                .get_var("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("HOME not set")),
        }
    }
}

impl BuiltinCommand for Cd {
    const NAME: &'static str = "cd";

    fn execute(self, env: &Environment) -> Result<()> {
        let target = self.destination(env)?;
        env::set_current_dir(&target).with_context(|| format!("can't chdir to {}", target.display()))
    }
}
