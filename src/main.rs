use clap::Parser;
use env_logger::Env;
use extractor_gate::cli::{dispatch, Cli};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(error) => {
            log::error!("{error:#}");
            eprintln!("❌ エラー: {error:#}");
            1
        }
    };

    std::process::exit(exit_code);
}
