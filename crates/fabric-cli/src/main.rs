mod logging;
mod runner;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logs();
    runner::main(std::env::args().collect())
}
