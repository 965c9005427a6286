use crate::utils::util::Result;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

/// The `.fam` side-car: one sample per line, tab-separated
/// `sample father mother population`, `NA` for absent fields. Sample order
/// here defines the haplotype order of the binary side-car.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pedigree {
    pub names: Vec<String>,
    pub fathers: Vec<String>,
    pub mothers: Vec<String>,
    pub populations: Vec<String>,
}

const NA: &str = "NA";

impl Pedigree {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Pedigree for samples known only by name (companion BCF inputs).
    pub fn from_names(names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            names,
            fathers: vec![NA.to_string(); n],
            mothers: vec![NA.to_string(); n],
            populations: vec![NA.to_string(); n],
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            crate::xcf_error!("Cannot open pedigree file [{}] for reading: {e}", path.display())
        })?;
        let mut ped = Pedigree::default();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                crate::xcf_error!("Error reading {}:{}: {e}", path.display(), line_num + 1)
            })?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                return Err(crate::xcf_error!(
                    "Blank line in pedigree file {}:{}",
                    path.display(),
                    line_num + 1
                ));
            }
            let fields: Vec<&str> = line.split('\t').collect();
            ped.names.push(fields[0].to_string());
            if fields.len() >= 3 {
                ped.fathers.push(fields[1].to_string());
                ped.mothers.push(fields[2].to_string());
                ped.populations
                    .push(fields.get(3).unwrap_or(&NA).to_string());
            } else {
                ped.fathers.push(NA.to_string());
                ped.mothers.push(NA.to_string());
                ped.populations.push(NA.to_string());
            }
        }
        Ok(ped)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| {
            crate::xcf_error!("Cannot open [{}] for writing: {e}", path.display())
        })?;
        let mut out = BufWriter::new(file);
        for i in 0..self.len() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                self.names[i], self.fathers[i], self.mothers[i], self.populations[i]
            )?;
        }
        out.flush()?;
        Ok(())
    }

    /// Restriction to the given sample indices, preserving their order.
    pub fn subset(&self, keep: &[usize]) -> Self {
        let pick = |v: &[String]| keep.iter().map(|&i| v[i].clone()).collect();
        Self {
            names: pick(&self.names),
            fathers: pick(&self.fathers),
            mothers: pick(&self.mothers),
            populations: pick(&self.populations),
        }
    }

    /// Index of each sample name.
    pub fn name_index(&self) -> std::collections::HashMap<&str, usize> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_read_fills_missing_fields_with_na() {
        let dir = TempDir::new("pedigree_test").unwrap();
        let path = dir.path().join("test.fam");
        std::fs::write(&path, "kid\tdad\tmom\tEUR\nsolo\nduo\tdad\tmom\n").unwrap();

        let ped = Pedigree::read(&path).unwrap();
        assert_eq!(ped.len(), 3);
        assert_eq!(ped.names, vec!["kid", "solo", "duo"]);
        assert_eq!(ped.fathers, vec!["dad", "NA", "dad"]);
        assert_eq!(ped.populations, vec!["EUR", "NA", "NA"]);
    }

    #[test]
    fn test_blank_lines_are_rejected() {
        let dir = TempDir::new("pedigree_test").unwrap();
        let path = dir.path().join("test.fam");
        std::fs::write(&path, "kid\tdad\tmom\tEUR\n\n").unwrap();
        assert!(Pedigree::read(&path).is_err());
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new("pedigree_test").unwrap();
        let path = dir.path().join("test.fam");
        let ped = Pedigree {
            names: vec!["s1".into(), "s2".into()],
            fathers: vec!["NA".into(), "s1".into()],
            mothers: vec!["NA".into(), "NA".into()],
            populations: vec!["EUR,FIN".into(), "NA".into()],
        };
        ped.write(&path).unwrap();
        assert_eq!(Pedigree::read(&path).unwrap(), ped);
    }

    #[test]
    fn test_subset_preserves_order() {
        let ped = Pedigree::from_names(vec!["a".into(), "b".into(), "c".into()]);
        let sub = ped.subset(&[2, 0]);
        assert_eq!(sub.names, vec!["c", "a"]);
    }
}
