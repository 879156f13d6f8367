pub struct DefaultsConfig {
    pub root: String,
    pub cycles: usize,
    pub seed: u64,
    pub pattern: Vec<usize>,
    pub dock_gap: f64,
    pub solvent_overlap: f64,
    pub solvent_padding: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            cycles: 5,
            seed: 0,
            pattern: vec![0],
            dock_gap: 2.5,
            solvent_overlap: 2.0,
            solvent_padding: 10.0,
        }
    }
}
