use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fmt::Write;

pub const REVERSED_ITEMS: [usize; 4] = [3, 4, 9, 12];
pub const ANXIETY_ITEMS: [usize; 6] = [1, 2, 5, 8, 10, 11];

/// Rows whose first anxiety item is left blank, removing them from the
/// response-surface fit while keeping them in the baseline fit.
pub fn blank_item(row: usize) -> bool {
    row % 10 == 3
}

/// Rows whose pain component is blank, removing them from every model.
pub fn blank_component(row: usize) -> bool {
    row % 17 == 5
}

fn response(latent: f64, noise: f64) -> f64 {
    (2.0 + 0.9 * latent + noise).round().clamp(0.0, 4.0)
}

/// A seeded synthetic cohort in the tab-separated input layout.
pub fn synthetic_cohort(n: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();

    let mut header = vec!["PID".to_string()];
    header.extend((1..=12).map(|i| format!("ecr_item_{i}")));
    header.extend(
        [
            "CCI_altersadjustiert",
            "OP_Schweregrad_plus30_Hoechster",
            "oncology_activity_z",
            "age",
            "sex_bin",
            "utilization_shortterm_z",
            "pharmaburden_z",
            "pain_burden_z",
            "sedation_risk_z",
            "lab_postop_Anzahl",
        ]
        .map(String::from),
    );

    let mut text = header.join("\t");
    text.push('\n');
    for row in 0..n {
        let anxiety = normal.sample(&mut rng);
        let avoidance = normal.sample(&mut rng);
        let mut cells = vec![format!("P{:04}", row + 1)];
        for item in 1..=12 {
            let latent = if ANXIETY_ITEMS.contains(&item) { anxiety } else { avoidance };
            let mut value = response(latent, 0.6 * normal.sample(&mut rng));
            if REVERSED_ITEMS.contains(&item) {
                value = 4.0 - value;
            }
            if item == 1 && blank_item(row) {
                cells.push(String::new());
            } else {
                cells.push(format!("{value}"));
            }
        }

        let cci = (3.0 + 2.0 * normal.sample(&mut rng)).abs().round();
        let severity = rng.gen_range(1..=4) as f64;
        let oncology = normal.sample(&mut rng);
        let age = 65.0 + 10.0 * normal.sample(&mut rng);
        let sex = if rng.gen_bool(0.5) { 1.0 } else { 0.0 };
        cells.extend([cci, severity, oncology, age, sex].map(|v| format!("{v}")));

        let burden = 0.3 * (cci - 3.0) / 2.0 + 0.2 * (severity - 2.5) + 0.2 * oncology;
        let attachment = 0.25 * anxiety + 0.1 * avoidance + 0.1 * anxiety * avoidance;
        for component in 0..4 {
            let value = burden + attachment + 0.8 * normal.sample(&mut rng);
            if component == 2 && blank_component(row) {
                cells.push(String::new());
            } else {
                cells.push(format!("{value}"));
            }
        }
        let labs = (5.0 + 3.0 * normal.sample(&mut rng)).abs().round();
        cells.push(format!("{labs}"));

        writeln!(text, "{}", cells.join("\t")).unwrap();
    }
    text
}
