use crate::errors::ProvError;
use crate::settings::ConfigStore;
use crate::steps::{
    self,
    Step,
};

pub(super) fn run(store: &ConfigStore) -> Result<(), ProvError> {
    let settings = store.load()?;

    for line in render(&steps::resolve_steps(&settings)) {
        println!("{line}");
    }

    Ok(())
}

fn render(steps: &[Step]) -> Vec<String> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            format!(
                "{:>2}. {:<20} [{}] {}",
                i + 1,
                step.name,
                step.failure_policy,
                serde_json::to_string(&step.action).unwrap_or_default(),
            )
        })
        .collect()
}
