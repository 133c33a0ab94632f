use crate::pipeline::state::Termination;

/// Stats from one audit run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub cycles: u32,
    pub termination: Option<Termination>,
    pub discovered: usize,
    pub harvested: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub analyzed: u64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Audit Run Complete ===")?;
        writeln!(f, "Harvest cycles:     {}", self.cycles)?;
        match self.termination {
            Some(t) => writeln!(f, "Termination:        {t}")?,
            None => writeln!(f, "Termination:        aborted")?,
        }
        writeln!(f, "Ids discovered:     {}", self.discovered)?;
        writeln!(f, "Ids harvested:      {}", self.harvested)?;
        writeln!(f, "Metrics fetched:    {}", self.fetched)?;
        writeln!(f, "Fetch failures:     {}", self.fetch_failures)?;
        let total = self.fetched.max(1);
        writeln!(
            f,
            "Values analyzed:    {} ({:.0}% of fetched)",
            self.analyzed,
            self.analyzed as f64 / total as f64 * 100.0
        )?;
        Ok(())
    }
}
