fn main() {
    let score = 0.5
    println!("{}", score);
}
