use anyhow::{Context, Result};
use argh::FromArgs;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;
use std::path::PathBuf;
use treesh::{ChunkedLines, EditorLines, Interpreter, LineSource, Settings};

#[derive(FromArgs)]
/// Read shell commands, build a command tree for each line and run it.
struct Options {
    #[argh(switch)]
    /// print every line as the chunks it was read in
    print_input: bool,

    #[argh(switch)]
    /// print the tokens of every line
    print_tokens: bool,

    #[argh(switch)]
    /// print the command tree of every line
    print_tree: bool,

    #[argh(switch)]
    /// with --print-tree, print every field of the tree
    full_tree: bool,

    #[argh(switch)]
    /// parse lines without running them
    no_exec: bool,

    #[argh(option)]
    /// read commands from this file, echoing each line before it runs
    script: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let options: Options = argh::from_env();

    let settings = Settings {
        echo_input: options.script.is_some(),
        print_input: options.print_input,
        print_tokens: options.print_tokens,
        print_tree: options.print_tree,
        full_tree: options.full_tree,
        execute: !options.no_exec,
    };

    let mut source: Box<dyn LineSource> = match &options.script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("can't open script {}", path.display()))?;
            Box::new(ChunkedLines::new(file))
        }
        None if io::stdin().is_terminal() => Box::new(EditorLines::new()?),
        None => {
            // read the descriptor directly, so no input is buffered away from
            // the commands that also read stdin
            let stdin = io::stdin()
                .as_fd()
                .try_clone_to_owned()
                .context("can't duplicate stdin")?;
            Box::new(ChunkedLines::new(File::from(stdin)))
        }
    };

    Interpreter::new(settings)?.run(source.as_mut())
}
