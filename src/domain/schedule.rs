// ============================================================
// Layer 3 — Run Schedule
// ============================================================
// Every periodic hook in the training loop is decided here from
// the iteration counter alone, via modulo checks:
//
//   validate : i % validate_every == 0           (fires at 0)
//   generate : i % generate_every == 0           (fires at 0)
//   evaluate : enabled && ((i % evaluate_every == 0 && i != 0)
//                          || i == num_iterations - 1)

/// Which periodic hooks fire at one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triggers {
    pub validate: bool,
    pub generate: bool,
    pub evaluate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSchedule {
    num_iterations: usize,
    validate_every: usize,
    generate_every: usize,
    /// None when quality evaluation is switched off
    evaluate_every: Option<usize>,
}

impl RunSchedule {
    /// All periods must be ≥ 1; the config layer checks this
    /// before a schedule is ever built.
    pub fn new(
        num_iterations: usize,
        validate_every: usize,
        generate_every: usize,
        evaluate_every: Option<usize>,
    ) -> Self {
        Self { num_iterations, validate_every, generate_every, evaluate_every }
    }

    pub fn is_final(&self, i: usize) -> bool {
        i + 1 == self.num_iterations
    }

    pub fn validates(&self, i: usize) -> bool {
        i % self.validate_every == 0
    }

    pub fn generates(&self, i: usize) -> bool {
        i % self.generate_every == 0
    }

    pub fn evaluates(&self, i: usize) -> bool {
        match self.evaluate_every {
            Some(every) => (i % every == 0 && i != 0) || self.is_final(i),
            None        => false,
        }
    }

    pub fn triggers(&self, i: usize) -> Triggers {
        Triggers {
            validate: self.validates(i),
            generate: self.generates(i),
            evaluate: self.evaluates(i),
        }
    }
}
