//! The `answerkey preview` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use answerkey_core::calc::Calculator;
use answerkey_core::config::load_config;
use answerkey_core::engine::GradingEngine;
use answerkey_core::parser;
use answerkey_core::responses::Grader;

pub fn execute(problems_path: PathBuf, seed: u64) -> Result<()> {
    let set = parser::parse_problem_set(&problems_path)?;
    let config = load_config()?;
    let engine = GradingEngine::new(Arc::new(Calculator::new()), None, &config)?;

    let mut table = Table::new();
    table.set_header(vec!["Problem", "Question", "Seed", "Display order", "Solution"]);

    for problem in &set.problems {
        let prepared = engine.prepare(problem, seed)?;
        for grader in prepared.graders() {
            let Grader::MultipleChoice(mc) = grader else {
                continue;
            };
            if mc.is_true_false() {
                continue;
            }
            table.add_row(vec![
                Cell::new(&problem.id),
                Cell::new(mc.question_id()),
                Cell::new(prepared.seed()),
                Cell::new(mc.display_order().join(", ")),
                Cell::new(mc.solution_id().unwrap_or("-")),
            ]);
        }
    }

    println!("Problem set: {} (seed {seed})", set.name);
    println!("{table}");
    Ok(())
}
