fn main() {
    #[cfg(feature = "cli")]
    xzrelay::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("xzrelay: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
