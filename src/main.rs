use clap::Parser;
use memory_visualizer_sim::config::Config;
use memory_visualizer_sim::run_simulation;

fn init_msg() {
    println!("memory visualizer simulation");
}

fn main() {
    env_logger::init();
    init_msg();
    let config = Config::parse();
    config.display();
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {}", err);
        std::process::exit(1);
    }
    println!();
    if let Err(err) = run_simulation(config) {
        eprintln!("simulation aborted: {}", err);
        std::process::exit(1);
    }
}
