fn main() {
    if let Err(err) = statechart_layout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
