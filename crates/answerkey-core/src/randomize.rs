//! Seeded choice randomization: shuffle, answer-pool sampling and masking.
//!
//! Every question in a problem draws from one [`GroupRng`], so sibling
//! questions are not independently predictable. Both tree passes are
//! idempotent; a [`ChoiceGroup`] remembers which passes it has run.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{ContentError, GradeError, Result};
use crate::model::{ChoiceCorrectness, ChoiceDef};

/// Lazily created random source shared by the questions of one problem.
#[derive(Debug)]
pub struct GroupRng {
    seed: u64,
    rng: Mutex<Option<StdRng>>,
}

impl GroupRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(None),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run `f` with exclusive access to the generator, creating it on first
    /// use.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut guard = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rng = guard.get_or_insert_with(|| StdRng::seed_from_u64(self.seed));
        f(rng)
    }
}

/// A choice together with the name it is graded and displayed under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedChoice {
    pub name: String,
    pub choice: ChoiceDef,
}

impl NamedChoice {
    pub fn is_correct(&self) -> bool {
        self.choice.correct == ChoiceCorrectness::True
    }
}

/// Assign regular names: `choice_<name>` for named choices, `choice_<n>`
/// (counting only unnamed ones) otherwise.
pub fn assign_names(choices: &[ChoiceDef]) -> Vec<NamedChoice> {
    let mut counter = 0;
    choices
        .iter()
        .map(|choice| {
            let name = match &choice.name {
                Some(n) => format!("choice_{n}"),
                None => {
                    let n = format!("choice_{counter}");
                    counter += 1;
                    n
                }
            };
            NamedChoice {
                name,
                choice: choice.clone(),
            }
        })
        .collect()
}

/// Private mapping from `mask_N` tokens back to regular names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameMask {
    mask_to_real: BTreeMap<String, String>,
}

impl NameMask {
    pub fn unmask(&self, name: &str) -> Option<&str> {
        self.mask_to_real.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mask_to_real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask_to_real.is_empty()
    }
}

/// Replace every name with a `mask_N` token, N drawn from a seeded
/// permutation. Returns the masked choices and the reverse mapping.
pub fn mask_names(choices: Vec<NamedChoice>, rng: &GroupRng) -> (Vec<NamedChoice>, NameMask) {
    let mut ids: Vec<usize> = (0..choices.len()).collect();
    rng.with_rng(|r| ids.shuffle(r));

    let mut mask = NameMask::default();
    let masked = choices
        .into_iter()
        .zip(ids)
        .map(|(mut nc, id)| {
            let token = format!("mask_{id}");
            mask.mask_to_real.insert(token.clone(), nc.name);
            nc.name = token;
            nc
        })
        .collect();
    (masked, mask)
}

/// Permute the movable middle of `choices`, keeping the leading and
/// trailing runs of fixed choices in place. A fixed choice between movable
/// ones joins the trailing run.
pub fn shuffle_choices<R: Rng + ?Sized>(
    choices: Vec<NamedChoice>,
    rng: &mut R,
) -> Vec<NamedChoice> {
    let mut head = Vec::new();
    let mut middle = Vec::new();
    let mut tail = Vec::new();
    let mut at_head = true;

    for nc in choices {
        if at_head && nc.choice.fixed {
            head.push(nc);
            continue;
        }
        at_head = false;
        if nc.choice.fixed {
            tail.push(nc);
        } else {
            middle.push(nc);
        }
    }

    middle.shuffle(rng);
    head.into_iter().chain(middle).chain(tail).collect()
}

/// Pick one correct choice and up to `pool_size - 1` incorrect ones, then
/// shuffle the subset. Returns the chosen correct choice's explanation id
/// with the subset.
pub fn sample_from_pool<R: Rng + ?Sized>(
    choices: Vec<NamedChoice>,
    pool_size: usize,
    rng: &mut R,
) -> Result<(Option<String>, Vec<NamedChoice>), ContentError> {
    let (mut correct, mut incorrect): (Vec<_>, Vec<_>) =
        choices.into_iter().partition(NamedChoice::is_correct);

    if correct.is_empty() || incorrect.is_empty() {
        return Err(ContentError::InsufficientPoolChoices);
    }

    let num_incorrect = pool_size.saturating_sub(1).min(incorrect.len());

    let index = rng.gen_range(0..correct.len());
    let chosen = correct.swap_remove(index);
    let solution_id = chosen.choice.explanation_id.clone();

    incorrect.shuffle(rng);
    incorrect.truncate(num_incorrect);

    let mut subset = Vec::with_capacity(num_incorrect + 1);
    subset.push(chosen);
    subset.extend(incorrect);
    subset.shuffle(rng);

    Ok((solution_id, subset))
}

/// Parse an `answer_pool` attribute. `None` means no pooling.
pub fn parse_pool_size(value: &str) -> Result<Option<usize>, ContentError> {
    let trimmed = value.trim();
    if trimmed == "0" {
        return Ok(None);
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ContentError::InvalidPoolSize(value.to_string()))
}

/// The displayed choices of one multiple-choice question plus the
/// bookkeeping for idempotent randomization.
#[derive(Debug, Clone)]
pub struct ChoiceGroup {
    choices: Vec<NamedChoice>,
    mask: Option<NameMask>,
    shuffled: bool,
    pooled: bool,
    solution_id: Option<String>,
}

impl ChoiceGroup {
    /// Name the choices, masking them when `masked` is set.
    pub fn new(choices: &[ChoiceDef], masked: bool, rng: &GroupRng) -> Self {
        let named = assign_names(choices);
        let (choices, mask) = if masked {
            let (c, m) = mask_names(named, rng);
            (c, Some(m))
        } else {
            (named, None)
        };
        Self {
            choices,
            mask,
            shuffled: false,
            pooled: false,
            solution_id: None,
        }
    }

    pub fn choices(&self) -> &[NamedChoice] {
        &self.choices
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    pub fn has_shuffle(&self) -> bool {
        self.shuffled
    }

    pub fn has_answer_pool(&self) -> bool {
        self.pooled
    }

    pub fn solution_id(&self) -> Option<&str> {
        self.solution_id.as_deref()
    }

    /// Run the shuffle and answer-pool passes as configured.
    pub fn randomize(
        &mut self,
        shuffle: bool,
        answer_pool: Option<&str>,
        rng: &GroupRng,
    ) -> Result<(), ContentError> {
        let answer_pool = answer_pool.filter(|p| p.trim() != "0");
        if shuffle {
            if answer_pool.is_some() {
                return Err(ContentError::ShuffleWithPool);
            }
            self.shuffle(rng);
        }
        if let Some(pool) = answer_pool {
            self.answer_pool(pool, rng)?;
        }
        Ok(())
    }

    /// Shuffle once; later calls do nothing.
    pub fn shuffle(&mut self, rng: &GroupRng) {
        if self.shuffled {
            return;
        }
        self.shuffled = true;
        let choices = std::mem::take(&mut self.choices);
        self.choices = rng.with_rng(|r| shuffle_choices(choices, r));
        tracing::debug!(order = ?self.names(), "shuffled choices");
    }

    /// Sample the answer pool once; later calls do nothing. A pool size of
    /// `0` leaves the choices untouched.
    pub fn answer_pool(&mut self, pool: &str, rng: &GroupRng) -> Result<(), ContentError> {
        let Some(size) = parse_pool_size(pool)? else {
            return Ok(());
        };
        if self.pooled {
            return Ok(());
        }
        let (solution_id, subset) =
            rng.with_rng(|r| sample_from_pool(self.choices.clone(), size, r))?;
        self.pooled = true;
        self.choices = subset;
        self.solution_id = solution_id;
        tracing::debug!(solution = ?self.solution_id, "sampled answer pool");
        Ok(())
    }

    /// Displayed names, masked if masking is on.
    pub fn names(&self) -> Vec<&str> {
        self.choices.iter().map(|nc| nc.name.as_str()).collect()
    }

    /// Recover the regular name behind a mask token.
    pub fn unmask(&self, name: &str) -> Result<String> {
        let mask = self.mask.as_ref().ok_or_else(|| {
            GradeError::Usage("unmask called on a question that is not masked".into())
        })?;
        mask.unmask(name)
            .map(str::to_string)
            .ok_or_else(|| GradeError::Usage(format!("unknown mask token '{name}'")))
    }

    /// Regular names in display order.
    pub fn display_order(&self) -> Vec<String> {
        self.choices
            .iter()
            .map(|nc| match &self.mask {
                Some(mask) => mask.unmask(&nc.name).unwrap_or(&nc.name).to_string(),
                None => nc.name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(correct: ChoiceCorrectness, fixed: bool) -> ChoiceDef {
        ChoiceDef {
            name: None,
            correct,
            point_value: None,
            fixed,
            explanation_id: None,
            text: String::new(),
        }
    }

    fn plain(n: usize) -> Vec<ChoiceDef> {
        (0..n).map(|_| choice(ChoiceCorrectness::False, false)).collect()
    }

    fn names(choices: &[NamedChoice]) -> Vec<String> {
        choices.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn assigns_sequential_and_explicit_names() {
        let mut defs = plain(3);
        defs[1].name = Some("b".into());
        let named = assign_names(&defs);
        assert_eq!(names(&named), vec!["choice_0", "choice_b", "choice_1"]);
    }

    #[test]
    fn same_seed_same_stream() {
        let a = GroupRng::new(42);
        let b = GroupRng::new(42);
        let xs: Vec<u32> = (0..5).map(|_| a.with_rng(|r| r.gen())).collect();
        let ys: Vec<u32> = (0..5).map(|_| b.with_rng(|r| r.gen())).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.seed(), 42);
    }

    #[test]
    fn shuffle_keeps_fixed_head_and_tail() {
        let mut defs = plain(8);
        defs[0].fixed = true;
        defs[6].fixed = true;
        defs[7].fixed = true;
        let named = assign_names(&defs);
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = shuffle_choices(named.clone(), &mut rng);

        assert_eq!(shuffled[0].name, "choice_0");
        assert_eq!(shuffled[6].name, "choice_6");
        assert_eq!(shuffled[7].name, "choice_7");
        let mut middle = names(&shuffled[1..6]);
        middle.sort();
        assert_eq!(middle, names(&named[1..6]));
    }

    #[test]
    fn fixed_island_joins_tail() {
        let mut defs = plain(5);
        defs[2].fixed = true;
        let named = assign_names(&defs);
        let mut rng = StdRng::seed_from_u64(1);
        let shuffled = shuffle_choices(named, &mut rng);
        assert_eq!(shuffled[4].name, "choice_2");
    }

    #[test]
    fn shuffle_is_idempotent() {
        let rng = GroupRng::new(3);
        let mut group = ChoiceGroup::new(&plain(6), false, &rng);
        group.shuffle(&rng);
        let once = group.names().iter().map(|s| s.to_string()).collect::<Vec<_>>();
        group.shuffle(&rng);
        group.randomize(true, None, &rng).unwrap();
        assert_eq!(group.names(), once);
        assert!(group.has_shuffle());
    }

    #[test]
    fn pool_has_one_correct_and_bounded_incorrect() {
        let mut defs = plain(6);
        defs[1].correct = ChoiceCorrectness::True;
        defs[1].explanation_id = Some("why-b".into());
        defs[4].correct = ChoiceCorrectness::True;
        defs[4].explanation_id = Some("why-e".into());

        for seed in 0..20 {
            for size in 1..7 {
                let mut rng = StdRng::seed_from_u64(seed);
                let (solution, subset) =
                    sample_from_pool(assign_names(&defs), size, &mut rng).unwrap();
                let correct: Vec<_> = subset.iter().filter(|c| c.is_correct()).collect();
                assert_eq!(correct.len(), 1);
                assert_eq!(subset.len() - 1, (size - 1).min(4));
                assert_eq!(solution, correct[0].choice.explanation_id);
            }
        }
    }

    #[test]
    fn pool_requires_both_sides() {
        let mut rng = StdRng::seed_from_u64(0);
        let all_wrong = assign_names(&plain(3));
        assert_eq!(
            sample_from_pool(all_wrong, 2, &mut rng).unwrap_err(),
            ContentError::InsufficientPoolChoices
        );

        let all_right: Vec<_> = (0..3).map(|_| choice(ChoiceCorrectness::True, false)).collect();
        assert_eq!(
            sample_from_pool(assign_names(&all_right), 2, &mut rng).unwrap_err(),
            ContentError::InsufficientPoolChoices
        );
    }

    #[test]
    fn partial_choices_count_as_incorrect_for_pooling() {
        let defs = vec![
            choice(ChoiceCorrectness::True, false),
            choice(ChoiceCorrectness::Partial, false),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (_, subset) = sample_from_pool(assign_names(&defs), 2, &mut rng).unwrap();
        assert_eq!(subset.len(), 2);
    }

    #[test]
    fn pool_size_parsing() {
        assert_eq!(parse_pool_size("0").unwrap(), None);
        assert_eq!(parse_pool_size(" 4 ").unwrap(), Some(4));
        assert!(matches!(
            parse_pool_size("four"),
            Err(ContentError::InvalidPoolSize(_))
        ));
        assert!(parse_pool_size("2.5").is_err());
    }

    #[test]
    fn pool_is_idempotent_and_zero_is_noop() {
        let mut defs = plain(5);
        defs[0].correct = ChoiceCorrectness::True;
        let rng = GroupRng::new(9);

        let mut untouched = ChoiceGroup::new(&defs, false, &rng);
        untouched.answer_pool("0", &rng).unwrap();
        assert_eq!(untouched.choices().len(), 5);
        assert!(!untouched.has_answer_pool());

        let mut group = ChoiceGroup::new(&defs, false, &rng);
        group.answer_pool("3", &rng).unwrap();
        let first: Vec<String> = group.names().iter().map(|s| s.to_string()).collect();
        group.answer_pool("3", &rng).unwrap();
        assert_eq!(group.names(), first);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn shuffle_with_pool_is_rejected() {
        let rng = GroupRng::new(0);
        let mut group = ChoiceGroup::new(&plain(3), false, &rng);
        assert_eq!(
            group.randomize(true, Some("2"), &rng).unwrap_err(),
            ContentError::ShuffleWithPool
        );
    }

    #[test]
    fn masking_round_trips() {
        let rng = GroupRng::new(11);
        let group = ChoiceGroup::new(&plain(4), true, &rng);
        assert!(group.has_mask());
        for name in group.names() {
            assert!(name.starts_with("mask_"));
            assert!(group.unmask(name).unwrap().starts_with("choice_"));
        }
        let mut order = group.display_order();
        order.sort();
        assert_eq!(order, vec!["choice_0", "choice_1", "choice_2", "choice_3"]);
    }

    #[test]
    fn unmask_without_mask_is_usage_error() {
        let rng = GroupRng::new(0);
        let group = ChoiceGroup::new(&plain(2), false, &rng);
        assert!(matches!(group.unmask("mask_0"), Err(GradeError::Usage(_))));
        assert_eq!(group.display_order(), vec!["choice_0", "choice_1"]);
    }
}
