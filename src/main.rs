use clap::Parser;

use pointshade::cli::{Cli, Command};
use pointshade::{network, points};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let timings = match cli.command {
        Command::Points(args) => {
            let spec = args.to_spec()?;
            points::run(&args.data_path, &args.output_path, &spec)?
        }
        Command::Network(args) => {
            let spec = args.to_spec()?;
            network::run(&args.nodes_file, &args.edges_file, &args.output_path, &spec)?
        }
    };

    println!("{timings}");
    Ok(())
}
