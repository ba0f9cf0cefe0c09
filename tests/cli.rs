/// End-to-end tests: run the compiled `pc_ancestry` binary on a synthetic reference panel.
///
/// The panel has well separated clusters in PC space (EUR at the origin, AFR shifted on
/// PC1, EAS shifted on PC2, and an AJ cluster shifted on PC3) with a few study samples
/// placed inside or far from them.
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const N_PCS: usize = 10;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pc_ancestry"))
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let jitter = Normal::new(0.0, 0.3).unwrap();

        let clusters: [(&str, [f64; 3]); 5] = [
            ("GBR", [0.0, 0.0, 0.0]),
            ("CEU", [0.0, 0.0, 0.0]),
            ("YRI", [10.0, 0.0, 0.0]),
            ("CHB", [0.0, 10.0, 0.0]),
            ("AJ", [0.0, 0.0, 10.0]),
        ];

        let mut eigenvec = String::from("#FID\tIID");
        for k in 1..=N_PCS {
            eigenvec.push_str(&format!("\tPC{}", k));
        }
        eigenvec.push('\n');
        let mut labels = String::from("IID\tPopulation\tSuperpopulation\n");

        for (code, centre) in clusters {
            for i in 0..15 {
                let iid = format!("{}_{}", code, i);
                let pcs: Vec<f64> = (0..N_PCS)
                    .map(|k| centre.get(k).copied().unwrap_or(0.0) + jitter.sample(&mut rng))
                    .collect();
                push_row(&mut eigenvec, "0", &iid, &pcs);
                labels.push_str(&format!("{}\t{}\tX\n", iid, code));
            }
        }
        // A reference row with an empty label maps to UNKNOWN -> OTHER.
        push_row(&mut eigenvec, "0", "NOLABEL_0", &[50.0; N_PCS]);
        labels.push_str("NOLABEL_0\t\tX\n");

        let study: [(&str, [f64; 3]); 4] = [
            ("study_eur", [0.1, 0.0, 0.0]),
            ("study_afr", [10.2, 0.1, 0.0]),
            ("study_aj", [0.0, 0.1, 9.9]),
            ("study_far", [100.0, 100.0, 0.0]),
        ];
        for (iid, centre) in study {
            let mut pcs = vec![0.0; N_PCS];
            pcs[..3].copy_from_slice(&centre);
            push_row(&mut eigenvec, "fam1", iid, &pcs);
        }

        fs::write(dir.path().join("study.eigenvec"), eigenvec).unwrap();
        let eigenval: String = (1..=N_PCS).map(|k| format!("{}\n", 20.0 / k as f64)).collect();
        fs::write(dir.path().join("study.eigenval"), eigenval).unwrap();
        fs::write(dir.path().join("labels.txt"), labels).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn out_prefix(&self) -> String {
        self.path("out").join("run").to_str().unwrap().to_string()
    }

    fn classify(&self, extra: &[&str]) -> Output {
        let pc_prefix = self.path("study");
        let labels = self.path("labels.txt");
        let out_prefix = self.out_prefix();
        let mut args = vec![
            "classify",
            "--pc-prefix",
            pc_prefix.to_str().unwrap(),
            "--ref-label",
            labels.to_str().unwrap(),
            "--ref-label-col",
            "Population",
            "--out-prefix",
            &out_prefix,
        ];
        args.extend_from_slice(extra);
        Command::new(binary())
            .args(&args)
            .output()
            .expect("failed to launch pc_ancestry binary")
    }

    fn output(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}_{}", self.out_prefix(), suffix))
    }
}

fn push_row(buf: &mut String, fid: &str, iid: &str, pcs: &[f64]) {
    buf.push_str(fid);
    buf.push('\t');
    buf.push_str(iid);
    for v in pcs {
        buf.push_str(&format!("\t{}", v));
    }
    buf.push('\n');
}

fn read_list(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
        .lines()
        .map(str::to_string)
        .collect()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "pc_ancestry failed: {}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn mahalanobis_split_writes_lists_and_table() {
    let fixture = Fixture::new();
    let output = fixture.classify(&["--split-method", "mahalanobis", "--no-plots"]);
    assert_success(&output);

    // AJ folds into EUR without --eur-aj-sep, so both EUR-like study samples land there.
    assert_eq!(
        read_list(&fixture.output("EUR.list")),
        vec!["fam1\tstudy_eur", "fam1\tstudy_aj"]
    );
    assert_eq!(read_list(&fixture.output("AFR.list")), vec!["fam1\tstudy_afr"]);
    assert_eq!(read_list(&fixture.output("OTHER.list")), vec!["fam1\tstudy_far"]);
    assert!(!fixture.output("EAS.list").exists());

    let table = read_list(&fixture.output("all_pca.csv"));
    assert_eq!(
        table[0],
        "#FID,IID,InfPop,PC1,PC2,PC3,PC4,PC5,PC6,PC7,PC8,PC9,PC10"
    );
    assert_eq!(table.len(), 5, "header plus four study rows");
    assert!(table[1].starts_with("fam1,study_eur,EUR,0.1,"));
    assert!(table[4].starts_with("fam1,study_far,OTHER,100,100,"));

    // Plotting disabled.
    assert!(!fixture.output("screeplot.svg").exists());
}

#[test]
fn sd_split_with_plots() {
    let fixture = Fixture::new();
    let output = fixture.classify(&["--split-method", "sd"]);
    assert_success(&output);

    assert_eq!(read_list(&fixture.output("AFR.list")), vec!["fam1\tstudy_afr"]);
    assert_eq!(read_list(&fixture.output("OTHER.list")), vec!["fam1\tstudy_far"]);

    for suffix in [
        "screeplot.svg",
        "Whole_group_PC1xPC2.svg",
        "Whole_ancestry_PC1xPC2.svg",
        "AFR_PC1xPC2.svg",
        "AFR_PC1xPC3.svg",
        "EUR_PC1xPC2.svg",
    ] {
        let path = fixture.output(suffix);
        let svg = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("missing plot {}: {}", path.display(), e));
        assert!(svg.contains("<svg"));
    }
    assert!(!fixture.output("OTHER_PC1xPC2.svg").exists());
}

#[test]
fn eur_aj_separation_uses_fine_labels() {
    let fixture = Fixture::new();
    let output = fixture.classify(&["--split-method", "mahalanobis", "--eur-aj-sep", "--no-plots"]);
    assert_success(&output);

    assert_eq!(read_list(&fixture.output("EUR-AJ.list")), vec!["fam1\tstudy_aj"]);
    assert_eq!(
        read_list(&fixture.output("EUR-nonAJ.list")),
        vec!["fam1\tstudy_eur"]
    );
    assert!(!fixture.output("EUR.list").exists());
}

#[test]
fn split_method_none_only_plots() {
    let fixture = Fixture::new();
    let output = fixture.classify(&[]);
    assert_success(&output);
    assert!(fixture.output("screeplot.svg").exists());
    assert!(fixture.output("Whole_group_PC1xPC2.svg").exists());
    assert!(!fixture.output("all_pca.csv").exists());
    assert!(!fixture.output("OTHER.list").exists());
}

#[test]
fn missing_inputs_fail() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.path("study.eigenvec")).unwrap();
    let output = fixture.classify(&["--split-method", "sd", "--no-plots"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("eigenvec"));

    let fixture = Fixture::new();
    let output = Command::new(binary())
        .args([
            "classify",
            "--pc-prefix",
            fixture.path("study").to_str().unwrap(),
            "--ref-label",
            fixture.path("labels.txt").to_str().unwrap(),
            "--ref-label-col",
            "NoSuchColumn",
            "--out-prefix",
            &fixture.out_prefix(),
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NoSuchColumn"));
}

#[test]
fn extend_panel_merges_extra_list() {
    let fixture = Fixture::new();
    let extra = fixture.path("aj.list");
    fs::write(&extra, "fam1\tstudy_aj\nfam1\tstudy_eur\n").unwrap();
    let out = fixture.path("panel").join("aj_1kg_eur");

    let output = Command::new(binary())
        .args([
            "extend-panel",
            "--ref-label",
            fixture.path("labels.txt").to_str().unwrap(),
            "--extra-list",
            extra.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert_success(&output);

    let list = read_list(&PathBuf::from(format!("{}.list", out.display())));
    // 15 GBR + 15 CEU + 15 AJ reference rows, plus the two extra samples.
    assert_eq!(list.len(), 47);
    assert!(list.contains(&"0\tGBR_0".to_string()));
    assert!(list.contains(&"fam1\tstudy_aj".to_string()));
    assert!(!list.iter().any(|l| l.contains("YRI")));

    let labels = read_list(&PathBuf::from(format!("{}_label.list", out.display())));
    assert_eq!(labels[0], "#FID\tIID\tlabel");
    assert!(labels.contains(&"fam1\tstudy_eur\tAJ".to_string()));
}
