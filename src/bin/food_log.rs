fn main() -> anyhow::Result<()> {
    food_lens::cli::run()
}
