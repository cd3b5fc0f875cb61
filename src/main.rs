fn main() {
    if let Err(err) = sheet_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
