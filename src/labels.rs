// labels.rs

/// Group assigned to reference codes that no taxonomy entry claims.
pub const OTHER: &str = "OTHER";

/// An ordered table of population groups, each owning a list of raw population codes.
///
/// Order matters: lookups return the first group containing a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    groups: Vec<(String, Vec<String>)>,
}

impl Taxonomy {
    pub fn new<G, C>(groups: impl IntoIterator<Item = (G, Vec<C>)>) -> Self
    where
        G: Into<String>,
        C: Into<String>,
    {
        Self {
            groups: groups
                .into_iter()
                .map(|(name, codes)| (name.into(), codes.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Continental groups of the 1000 Genomes panel, with AJ folded into EUR.
    pub fn continental() -> Self {
        Self::new([
            ("AMR", vec!["MXL", "CLM", "PEL", "PUR"]),
            ("EAS", vec!["JPT", "CDX", "CHB", "CHS", "KHV", "CHD"]),
            ("EUR", vec!["TSI", "IBS", "GBR", "CEU", "AJ", "FIN"]),
            ("SAS", vec!["PJL", "ITU", "STU", "GIH", "BEB"]),
            ("AFR", vec!["GWD", "MSL", "ESN", "GWJ", "YRI", "LWK", "GWF", "GWW"]),
            ("AAC", vec!["ASW", "ACB"]),
        ])
    }

    /// Splits EUR into Ashkenazi and non-Ashkenazi sub-groups.
    pub fn eur_aj_split() -> Self {
        Self::new([
            ("EUR-nonAJ", vec!["TSI", "IBS", "GBR", "CEU", "FIN"]),
            ("EUR-AJ", vec!["AJ"]),
        ])
    }

    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, codes)| codes.iter().any(|c| c == code))
            .map(|(name, _)| name.as_str())
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }
}

/// Maps raw reference population codes to ancestry groups.
///
/// With a fine split configured, codes found in the split table take the finer label and
/// everything else falls back to the base taxonomy. Unknown codes map to [`OTHER`].
#[derive(Debug, Clone)]
pub struct LabelMapper {
    base: Taxonomy,
    fine_split: Option<Taxonomy>,
}

impl LabelMapper {
    pub fn new(base: Taxonomy) -> Self {
        Self {
            base,
            fine_split: None,
        }
    }

    pub fn with_fine_split(mut self, split: Taxonomy) -> Self {
        self.fine_split = Some(split);
        self
    }

    pub fn continental(eur_aj_sep: bool) -> Self {
        let mapper = Self::new(Taxonomy::continental());
        if eur_aj_sep {
            mapper.with_fine_split(Taxonomy::eur_aj_split())
        } else {
            mapper
        }
    }

    pub fn group_for<'a>(&'a self, code: &str) -> &'a str {
        self.fine_split
            .as_ref()
            .and_then(|split| split.lookup(code))
            .or_else(|| self.base.lookup(code))
            .unwrap_or(OTHER)
    }

    pub fn base(&self) -> &Taxonomy {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_lookup_and_unknown_codes() {
        let mapper = LabelMapper::continental(false);
        assert_eq!(mapper.group_for("YRI"), "AFR");
        assert_eq!(mapper.group_for("AJ"), "EUR");
        assert_eq!(mapper.group_for("ACB"), "AAC");
        assert_eq!(mapper.group_for("UNKNOWN"), OTHER);
        assert_eq!(mapper.group_for(""), OTHER);
    }

    #[test]
    fn test_fine_split_takes_precedence_over_base() {
        let mapper = LabelMapper::continental(true);
        // AJ is in the base EUR list as well; the split table must win.
        assert_eq!(mapper.group_for("AJ"), "EUR-AJ");
        assert_eq!(mapper.group_for("GBR"), "EUR-nonAJ");
        // Codes outside the split fall back to the base taxonomy.
        assert_eq!(mapper.group_for("CHB"), "EAS");
        assert_eq!(mapper.group_for("XYZ"), OTHER);
    }

    #[test]
    fn test_first_matching_group_wins() {
        let taxonomy = Taxonomy::new([("A", vec!["x", "y"]), ("B", vec!["y", "z"])]);
        let mapper = LabelMapper::new(taxonomy);
        assert_eq!(mapper.group_for("y"), "A");
        assert_eq!(mapper.group_for("z"), "B");
    }

    #[test]
    fn test_injected_split_only_code() {
        let base = Taxonomy::new([("COARSE", vec!["p", "q"])]);
        let split = Taxonomy::new([("FINE", vec!["q"])]);
        let mapper = LabelMapper::new(base).with_fine_split(split);
        assert_eq!(mapper.group_for("q"), "FINE");
        assert_eq!(mapper.group_for("p"), "COARSE");
        assert_eq!(
            mapper.base().group_names().collect::<Vec<_>>(),
            vec!["COARSE"]
        );
    }
}
