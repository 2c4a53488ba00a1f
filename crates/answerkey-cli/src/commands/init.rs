//! The `answerkey init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("answerkey.toml").exists() {
        println!("answerkey.toml already exists, skipping.");
    } else {
        std::fs::write("answerkey.toml", SAMPLE_CONFIG)?;
        println!("Created answerkey.toml");
    }

    std::fs::create_dir_all("problem-sets")?;
    let example_path = std::path::Path::new("problem-sets/example.toml");
    if example_path.exists() {
        println!("problem-sets/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_PROBLEM_SET)?;
        println!("Created problem-sets/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: answerkey validate --problems problem-sets/example.toml");
    println!("  2. Run: answerkey preview --problems problem-sets/example.toml --seed 1");
    println!("  3. Write a submissions JSON file keyed by problem id, then run:");
    println!("     answerkey grade --problems problem-sets/example.toml --submissions answers.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# answerkey configuration

default_tolerance = "0.001%"
partial_credit_fraction = 0.5
partial_range = 2.0
parallelism = 4
output_dir = "./answerkey-results"

[sandbox]
timeout_ms = 2000
max_operations = 1000000
allow_unsafe = false
"#;

const EXAMPLE_PROBLEM_SET: &str = r#"[problem_set]
id = "example"
name = "Example Problem Set"
description = "A few questions to get started"

[[problems]]
id = "circle"
seed = 1

[problems.context]
r = 2

[[problems.questions]]
id = "area"
type = "numerical"
answer = "pi * $r^2"
tolerance = "1%"
partial_credit = "close"

[[problems.questions]]
id = "unit"
type = "multiple_choice"
shuffle = true

[[problems.questions.choices]]
correct = true
text = "square metres"

[[problems.questions.choices]]
correct = false
text = "metres"

[[problems.questions.choices]]
correct = false
text = "cubic metres"

[[problems]]
id = "primes"

[[problems.questions]]
id = "which"
type = "choice_set"
partial_credit = "edc"

[[problems.questions.choices]]
correct = true
text = "2"

[[problems.questions.choices]]
correct = false
text = "4"

[[problems.questions.choices]]
correct = true
text = "7"

[[problems.questions.choices]]
correct = false
text = "9"
"#;
