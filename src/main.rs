fn main() {
    if let Err(e) = dirsift::app::run_cli() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
