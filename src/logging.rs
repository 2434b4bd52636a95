use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;

pub fn init_logging(log_fp: Option<&Path>, debug: bool) -> Option<Handle> {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("> {m}{n}")))
        .build();
    let mut config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(fp) = log_fp {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "[{d(%Y-%m-%d %H:%M:%S)}] [{l}] {m}{n}",
            )))
            .build(fp);
        match logfile {
            Ok(appender) => {
                config = config.appender(
                    Appender::builder().build("logfile", Box::new(appender)),
                );
                root = root.appender("logfile");
            }
            Err(e) => {
                eprintln!(
                    "failed to create log file at {}, {e}",
                    fp.to_string_lossy()
                );
            }
        }
    }

    match config.build(root.build(level)) {
        Ok(config) => log4rs::init_config(config).ok(),
        Err(e) => {
            eprintln!("failed to configure logging, {e}");
            None
        }
    }
}
