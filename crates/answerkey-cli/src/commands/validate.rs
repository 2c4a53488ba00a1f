//! The `answerkey validate` command.

use std::path::PathBuf;

use anyhow::Result;

use answerkey_core::parser;

pub fn execute(problems_path: PathBuf) -> Result<()> {
    let sets = parser::load_problem_sets(&problems_path)?;

    let mut total_warnings = 0;

    for set in &sets {
        let questions: usize = set.problems.iter().map(|p| p.questions.len()).sum();
        println!(
            "Problem set: {} ({} problems, {} questions)",
            set.name,
            set.problems.len(),
            questions
        );

        let warnings = parser::validate_problem_set(set);
        for w in &warnings {
            let location = match (&w.problem_id, &w.question_id) {
                (Some(p), Some(q)) => format!("  [{p}/{q}]"),
                (Some(p), None) => format!("  [{p}]"),
                _ => "  ".to_string(),
            };
            println!("{location} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All problem sets valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
