fn main() {
    if let Err(err) = prediviz::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
