fn main() {
    ion11::cli::run();
}
