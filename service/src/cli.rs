//! Argument parsing for `dot-push`.

use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use quote_image::{DitherAlgorithm, FitMode};

pub const USAGE: &str = "\
usage: dot-push <command> [options]

commands:
  devices                                   list devices with status
  status [--device ID]                      show one device's status
  tasks [--device ID] [--type TYPE]         list device tasks (default type: loop)
  image <path> [ALGORITHM] [FIT] [--device ID] [--preview OUT.png]
                                            push an image (FIT: cover|contain|stretch)
  text <body> [--title T] [--signature S] [--render ALGORITHM] [--device ID]
                                            push text; --render rasterizes locally
  next [--device ID]                        show the device's next page

algorithms: none, floyd_steinberg, atkinson, sierra, two_row_sierra,
            sierra_lite, burkes, stucki, jarvis_judice_ninke";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Devices,
    Status {
        device: Option<String>,
    },
    Tasks {
        device: Option<String>,
        task_type: String,
    },
    Image {
        path: PathBuf,
        algorithm: DitherAlgorithm,
        fit: FitMode,
        device: Option<String>,
        /// Write the dithered frame here instead of pushing it.
        preview: Option<PathBuf>,
    },
    Text {
        body: String,
        title: Option<String>,
        signature: Option<String>,
        render: Option<DitherAlgorithm>,
        device: Option<String>,
    },
    Next {
        device: Option<String>,
    },
}

type Split = (Vec<String>, Vec<(String, String)>);

/// Split into positionals and `--flag value` pairs.
fn split_args(args: Vec<String>) -> Result<Split, anyhow::Error> {
    let mut positionals = Vec::new();
    let mut flags = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--{name} needs a value"))?;
            flags.push((name.to_string(), value));
        } else {
            positionals.push(arg);
        }
    }
    Ok((positionals, flags))
}

struct Flags(Vec<(String, String)>);

impl Flags {
    fn take(&mut self, name: &str) -> Option<String> {
        let pos = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(pos).1)
    }

    fn finish(self) -> Result<(), anyhow::Error> {
        match self.0.first() {
            Some((name, _)) => bail!("unknown option --{name}"),
            None => Ok(()),
        }
    }
}

/// Parse arguments following the program name.
pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Command, anyhow::Error> {
    let (positionals, flags) = split_args(args.into_iter().collect())?;
    let mut flags = Flags(flags);
    let mut positionals = positionals.into_iter();
    let command = positionals.next().ok_or_else(|| anyhow!("missing command"))?;
    let rest: Vec<String> = positionals.collect();

    let cmd = match command.as_str() {
        "devices" => Command::Devices,
        "status" => Command::Status {
            device: flags.take("device"),
        },
        "tasks" => Command::Tasks {
            device: flags.take("device"),
            task_type: flags.take("type").unwrap_or_else(|| "loop".into()),
        },
        "image" => {
            let path = rest.first().ok_or_else(|| anyhow!("image needs a file path"))?;
            let algorithm = match rest.get(1) {
                Some(a) => a.parse::<DitherAlgorithm>().context("invalid dither algorithm")?,
                None => DitherAlgorithm::default(),
            };
            let fit = match rest.get(2) {
                Some(f) => f.parse::<FitMode>().map_err(|e| anyhow!(e))?,
                None => FitMode::default(),
            };
            Command::Image {
                path: PathBuf::from(path),
                algorithm,
                fit,
                device: flags.take("device"),
                preview: flags.take("preview").map(PathBuf::from),
            }
        }
        "text" => {
            if rest.is_empty() {
                bail!("text needs a body");
            }
            let render = flags
                .take("render")
                .map(|a| a.parse::<DitherAlgorithm>())
                .transpose()
                .context("invalid --render algorithm")?;
            Command::Text {
                body: rest.join(" "),
                title: flags.take("title"),
                signature: flags.take("signature"),
                render,
                device: flags.take("device"),
            }
        }
        "next" => Command::Next {
            device: flags.take("device"),
        },
        other => bail!("unknown command '{other}'"),
    };

    flags.finish()?;
    Ok(cmd)
}
