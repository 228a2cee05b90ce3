fn main() -> anyhow::Result<()> {
    plagcheck_lib::run()
}
