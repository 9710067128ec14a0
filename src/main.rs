fn main() {
    if let Err(err) = holder_rs::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
