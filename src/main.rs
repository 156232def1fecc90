fn main() -> anyhow::Result<()> {
    ghopper_input::logging::init();
    ghopper_input::cli::run()
}
