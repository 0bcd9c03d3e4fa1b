//! Static compound and mixture catalog.

use crate::chemistry::{Compound, Sample};
use crate::error::{EngineError, Result};

/// (id, name, hydrophobicity, response height, UV max nm)
const COMPOUNDS: [(&str, &str, f64, f64, f64); 4] = [
    ("paracetamol", "Paracetamol", 0.35, 1.0, 243.0),
    ("caffeine", "Caffeine", 0.55, 1.0, 273.0),
    ("aspirin", "Aspirin", 0.70, 0.9, 276.0),
    ("ibuprofen", "Ibuprofen", 0.85, 0.8, 222.0),
];

/// Mixtures, as compound ids in injection order.
const MIXTURES: [(&str, &[&str]); 2] = [
    ("analgesic_mix", &["paracetamol", "caffeine", "aspirin"]),
    ("full_panel", &["paracetamol", "caffeine", "aspirin", "ibuprofen"]),
];

/// Sample selected when nothing else is chosen.
pub const DEFAULT_SAMPLE: &str = "caffeine";

/// Looks up a single compound.
pub fn compound(id: &str) -> Option<Compound> {
    let key = id.to_lowercase();
    COMPOUNDS
        .iter()
        .find(|(cid, ..)| *cid == key)
        .map(|&(_, name, hydrophobicity, height, uv)| {
            Compound::new(name, hydrophobicity, height).with_uv_max(uv)
        })
}

/// Builds the sample for a catalog id: a compound or a mixture.
pub fn sample(id: &str) -> Result<Sample> {
    let key = id.to_lowercase();

    if let Some(c) = compound(&key) {
        return Sample::new(key, vec![c]);
    }

    let (_, members) = MIXTURES
        .iter()
        .find(|(mid, _)| *mid == key)
        .ok_or_else(|| EngineError::UnknownSample(id.to_string()))?;

    let compounds = members
        .iter()
        .map(|m| compound(m).ok_or_else(|| EngineError::UnknownSample(m.to_string())))
        .collect::<Result<Vec<_>>>()?;
    Sample::new(key, compounds)
}

/// All selectable sample ids: compounds first, then mixtures.
pub fn sample_ids() -> Vec<&'static str> {
    COMPOUNDS
        .iter()
        .map(|(id, ..)| *id)
        .chain(MIXTURES.iter().map(|(id, _)| *id))
        .collect()
}
