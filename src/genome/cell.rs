use super::template::Line;
use crate::{
    error::{EvoError, EvoResult},
    network::activate::ActivationFunction,
};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// The closed set of cell behaviours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Input,
    Output,
    Perceptron,
    Transistor,
    If,
    And,
    Max,
    Min,
}

impl CellKind {
    pub const ALL: [Self; 8] = [
        Self::Input,
        Self::Output,
        Self::Perceptron,
        Self::Transistor,
        Self::If,
        Self::And,
        Self::Max,
        Self::Min,
    ];

    /// Kinds that may be placed between inputs and outputs
    pub const HIDDEN: [Self; 6] = [
        Self::Perceptron,
        Self::Transistor,
        Self::If,
        Self::And,
        Self::Max,
        Self::Min,
    ];

    pub fn is_hidden(&self) -> bool {
        !matches!(self, Self::Input | Self::Output)
    }

    /// Inbound connections needed before the cell function runs at all
    pub fn minimum_inputs(&self) -> usize {
        match self {
            Self::Input => 0,
            Self::Output | Self::Perceptron => 1,
            Self::Transistor | Self::If | Self::And | Self::Max | Self::Min => 2,
        }
    }

    pub fn maximum_inputs(&self) -> usize {
        match self {
            Self::Input => 0,
            Self::If => 3,
            _ => usize::MAX,
        }
    }

    pub fn maximum_outputs(&self) -> usize {
        match self {
            Self::Output => 0,
            _ => usize::MAX,
        }
    }

    /// Whether a cell of this kind may feed itself, given how many inbound connections
    /// it has from other cells
    pub fn allows_self_connection(&self, real_inputs: usize) -> bool {
        match self {
            Self::Input | Self::If => false,
            Self::Transistor => real_inputs >= 1,
            _ => true,
        }
    }

    /// Label used by the template text format
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::Perceptron => "PERCEPTRON",
            Self::Transistor => "TRANSISTOR",
            Self::If => "IF",
            Self::And => "AND",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CellKind {
    type Err = EvoError;

    fn from_str(s: &str) -> EvoResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| EvoError::UnknownCellType(s.to_string()))
    }
}

/// Compute the next state of a cell of `kind`.
///
/// `inputs` holds every inbound value already multiplied by its connection weight, in
/// insertion order. Self connections are expected to have been resolved against the
/// previous state. For [CellKind::Input], `state` carries the external value.
/// Non-finite results collapse to 0.
pub fn evaluate(kind: CellKind, state: f64, inputs: &[f64], bias: f64) -> f64 {
    let next = match kind {
        CellKind::Input => state,
        CellKind::Output | CellKind::Perceptron => bias + inputs.iter().sum::<f64>(),
        CellKind::And => {
            if inputs.is_empty() || inputs.iter().any(|v| *v < bias) {
                0.
            } else {
                inputs.iter().sum::<f64>() / inputs.len() as f64
            }
        }
        CellKind::Max => by_magnitude(inputs, |l, r| l > r).map_or(0., |v| v + bias),
        CellKind::Min => by_magnitude(inputs, |l, r| l < r).map_or(0., |v| v + bias),
        // two inputs gate the second one, three inputs branch between them
        CellKind::If => match inputs {
            [condition, then, _] if *condition < bias => bias + then,
            [_, _, otherwise] => bias + otherwise,
            [condition, _] if *condition < bias => 0.,
            [_, then] => bias + then,
            _ => 0.,
        },
        CellKind::Transistor => match inputs {
            [base, ..] if *base < bias => 0.,
            [base, rest @ ..] if !rest.is_empty() => {
                let gain = if bias == 0. { 1. } else { base / bias };
                (rest.iter().sum::<f64>() / rest.len() as f64 + bias) * gain
            }
            _ => 0.,
        },
    };

    if next.is_finite() {
        next
    } else {
        0.
    }
}

/// First input whose magnitude wins `better` against every earlier winner
fn by_magnitude(inputs: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<f64> {
    inputs.iter().copied().fold(None, |best, v| match best {
        Some(b) if !better(v.abs(), f64::abs(b)) => Some(b),
        _ => Some(v),
    })
}

/// A single computational unit of a [crate::Network]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    pub kind: CellKind,
    pub bias: f64,
    pub activation: ActivationFunction,
    pub threshold: f64,
    #[serde(skip)]
    pub state: f64,
    #[serde(skip)]
    pub previous_state: f64,
    #[serde(skip)]
    pub last_activation: f64,
    /// slots of the owning network's connection arena, in insertion order
    pub(crate) inbound: Vec<usize>,
    pub(crate) outbound: Vec<usize>,
}

impl Cell {
    pub fn new(
        id: impl Into<String>,
        kind: CellKind,
        bias: f64,
        activation: ActivationFunction,
        threshold: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            bias,
            activation,
            threshold,
            state: 0.,
            previous_state: 0.,
            last_activation: 0.,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    pub fn inbound(&self) -> &[usize] {
        &self.inbound
    }

    pub fn outbound(&self) -> &[usize] {
        &self.outbound
    }

    /// Run the cell function over already weighted `inputs`, leaving the cell untouched when
    /// it has fewer inbound connections than its kind requires
    pub fn activate(&mut self, inputs: &[f64]) {
        if self.inbound.len() < self.kind.minimum_inputs() {
            return;
        }

        self.state = evaluate(self.kind, self.state, inputs, self.bias);
        let result = self.activation.apply(self.state);
        self.last_activation = if result.abs() < self.threshold || !result.is_finite() {
            0.
        } else {
            result
        };
    }

    pub fn reset(&mut self) {
        self.state = 0.;
        self.previous_state = 0.;
        self.last_activation = 0.;
    }

    /// Same genes, no links and no transient state
    pub fn detached(&self) -> Self {
        Self::new(
            self.id.clone(),
            self.kind,
            self.bias,
            self.activation,
            self.threshold,
        )
    }

    pub fn to_template_line(&self) -> String {
        format!(
            "ADD CELL ID={} TYPELABEL={} BIAS={} ACTIVATIONTHRESHOLD={} ACTIVATIONFUNCTION={}",
            self.id, self.kind, self.bias, self.threshold, self.activation
        )
    }

    pub fn from_template_line(line: &Line<'_>) -> EvoResult<Self> {
        Ok(Self::new(
            line.required("ID")?,
            line.parse("TYPELABEL")?,
            line.parse("BIAS")?,
            line.parse("ACTIVATIONFUNCTION")?,
            line.parse("ACTIVATIONTHRESHOLD")?,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{assert_f64_approx, genome::template, test_kinds};

    fn wired(kind: CellKind, inbound: usize) -> Cell {
        let mut cell = Cell::new("c", kind, 0.25, ActivationFunction::Identity, 0.);
        cell.inbound = (0..inbound).collect();
        cell.state = 0.75;
        cell
    }

    test_kinds!(below_minimum_leaves_state[K: Output | Perceptron | Transistor | If | And | Max | Min]() {
        let kind = K;
        let mut cell = wired(kind, kind.minimum_inputs() - 1);
        cell.last_activation = 0.5;
        cell.activate(&vec![1.; kind.minimum_inputs() - 1]);
        assert_f64_approx!(cell.state, 0.75);
        assert_f64_approx!(cell.last_activation, 0.5);
    });

    test_kinds!(limits_are_consistent[K: Input | Output | Perceptron | Transistor | If | And | Max | Min]() {
        let kind = K;
        assert!(kind.minimum_inputs() <= kind.maximum_inputs());
        assert_eq!(kind, kind.label().parse::<CellKind>().unwrap());
    });

    #[test]
    fn test_perceptron() {
        assert_f64_approx!(evaluate(CellKind::Perceptron, 9., &[0.5, -0.25], 1.), 1.25);
        assert_f64_approx!(evaluate(CellKind::Output, 9., &[0.5, -0.25], 1.), 1.25);
    }

    #[test]
    fn test_and() {
        assert_f64_approx!(evaluate(CellKind::And, 0., &[0.6, 0.8], 0.5), 0.7);
        assert_f64_approx!(evaluate(CellKind::And, 0., &[0.3, 0.8], 0.5), 0.);
        assert_f64_approx!(evaluate(CellKind::And, 0., &[], 0.5), 0.);
    }

    #[test]
    fn test_max_min_by_magnitude() {
        let inputs = [-1.0, -0.5, 0.9];
        assert_f64_approx!(evaluate(CellKind::Max, 0., &inputs, 0.), -1.0);
        assert_f64_approx!(evaluate(CellKind::Min, 0., &inputs, 0.), -0.5);
        assert_f64_approx!(evaluate(CellKind::Max, 0., &inputs, 0.25), -0.75);
    }

    #[test]
    fn test_max_min_ties_keep_first() {
        assert_f64_approx!(evaluate(CellKind::Max, 0., &[-0.5, 0.5], 0.), -0.5);
        assert_f64_approx!(evaluate(CellKind::Min, 0., &[0.5, -0.5, 1.], 0.), 0.5);
    }

    #[test]
    fn test_if() {
        // condition below bias takes the first branch
        assert_f64_approx!(evaluate(CellKind::If, 0., &[0.1, 0.4, 2.], 0.5), 0.9);
        // otherwise the second one
        assert_f64_approx!(evaluate(CellKind::If, 0., &[0.9, 0.4, 2.], 0.5), 2.5);
        // a closed two input gate returns exactly 0, without the bias
        assert_eq!(evaluate(CellKind::If, 0., &[0.1, 0.4], 0.5), 0.);
        assert_f64_approx!(evaluate(CellKind::If, 0., &[0.9, 0.4], 0.5), 0.9);
    }

    #[test]
    fn test_transistor() {
        // base below bias closes the gate
        assert_f64_approx!(evaluate(CellKind::Transistor, 0., &[0.2, 1., 1.], 0.5), 0.);
        // gain = 1.0 / 0.5, mean of [1, 0] plus bias = 1.0
        assert_f64_approx!(evaluate(CellKind::Transistor, 0., &[1., 1., 0.], 0.5), 2.);
        // no gain scaling when the bias is zero
        assert_f64_approx!(evaluate(CellKind::Transistor, 0., &[3., 0.4], 0.), 0.4);
        assert_f64_approx!(evaluate(CellKind::Transistor, 0., &[3.], 0.), 0.);
    }

    #[test]
    fn test_non_finite_collapses() {
        assert_eq!(evaluate(CellKind::Perceptron, 0., &[f64::INFINITY, f64::NEG_INFINITY], 0.), 0.);
        assert_eq!(evaluate(CellKind::Perceptron, 0., &[f64::NAN], 0.), 0.);
    }

    #[test]
    fn test_input_passthrough() {
        assert_f64_approx!(evaluate(CellKind::Input, 0.3, &[5.], 1.), 0.3);
    }

    #[test]
    fn test_activate_threshold_gate() {
        let mut cell = wired(CellKind::Perceptron, 1);
        cell.bias = 0.;
        cell.threshold = 0.5;
        cell.activate(&[0.4]);
        assert_f64_approx!(cell.state, 0.4);
        assert_eq!(cell.last_activation, 0.);
        cell.activate(&[-0.6]);
        assert_f64_approx!(cell.last_activation, -0.6);
    }

    #[test]
    fn test_template_round_trip() {
        let cell = Cell::new("H12", CellKind::Transistor, -0.125, ActivationFunction::SoftSign, 0.3);
        let text = cell.to_template_line();
        let line = template::tokenize(1, &text);
        let parsed = Cell::from_template_line(&line).unwrap();
        assert_eq!(parsed.id, cell.id);
        assert_eq!(parsed.kind, cell.kind);
        assert_eq!(parsed.bias, cell.bias);
        assert_eq!(parsed.threshold, cell.threshold);
        assert_eq!(parsed.activation, cell.activation);
    }

    #[test]
    fn test_template_bad_label() {
        let line = template::tokenize(
            3,
            "ADD CELL ID=x TYPELABEL=XOR BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH",
        );
        assert!(matches!(
            Cell::from_template_line(&line),
            Err(EvoError::Template { line: 3, .. })
        ));
    }
}
