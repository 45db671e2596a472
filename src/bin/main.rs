fn main() {
    krill::main()
}
