use log::info;
use ndarray::prelude::*;

/// Orbital energies as a fixed-width table, `per_line` values per row.
/// Used for the debug dump after the occupation step.
pub fn format_mo_energies(orbe: ArrayView1<f64>, per_line: usize) -> String {
    let mut out = String::new();
    for (i, e) in orbe.iter().enumerate() {
        if i > 0 && i % per_line == 0 {
            out.push('\n');
        }
        out.push_str(&format!("{:>14.8}", e));
    }
    out
}

pub fn print_scf_header(nao: usize, nelec: (usize, usize)) {
    info!("{:^80}", "");
    info!("{:^80}", "unrestricted Hartree-Fock");
    info!("{:-^80}", "");
    info!("{: <25} {}", "number of AOs:", nao);
    info!("{: <25} {} alpha / {} beta", "electrons:", nelec.0, nelec.1);
    info!("{:-^80}", "");
    info!(
        "{: <5} {: >18} {: >18} {: >18}",
        "iter.", "energy [Hartree]", "energy diff.", "gradient norm"
    );
    info!("{:-^80}", "");
}

pub fn print_scf_cycle(cycle: usize, e_elec: f64, de: f64, gnorm: f64) {
    info!(
        "{: >5} {:>18.10} {:>18.10e} {:>18.10e}",
        cycle + 1,
        e_elec,
        de,
        gnorm
    );
}

pub fn print_scf_end(converged: bool, cycles: usize, e_elec: f64) {
    info!("{:-^80}", "");
    if converged {
        info!("SCF converged after {} cycles", cycles);
    } else {
        info!("SCF did NOT converge within {} cycles", cycles);
    }
    info!("{: <25} {:>18.10} Hartree", "electronic energy:", e_elec);
    info!("{:-^80}", "");
}

#[test]
fn mo_energy_table_wraps_lines() {
    let e = array![-1.0, -0.5, 0.25, 0.75];
    let table = format_mo_energies(e.view(), 2);
    assert_eq!(table.lines().count(), 2);
    assert!(table.contains("-1.00000000"));
    assert!(table.contains("0.75000000"));
}
