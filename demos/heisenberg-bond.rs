use symblock::{ Charge, CompositeTensor, Direction, Leg };

// spin projection of a dense index on a spin-1/2 leg with sectors (2Sz = -1, 1)
fn sz(i: usize) -> f64 { if i == 1 { 0.5 } else { -0.5 } }

// <a b| S1 . S2 |c d>
fn heisenberg(idx: &[usize]) -> f64 {
    let (a, b, c, d) = (idx[0], idx[1], idx[2], idx[3]);
    if a == c && b == d {
        sz(a) * sz(b)
    } else if a != b && a == d && b == c {
        0.5
    } else {
        0.0
    }
}

// Build the two-site Heisenberg coupling as a U(1)-symmetric tensor, apply it to
// the singlet and the triplet states with total Sz = 0, and print the energies.
fn main() -> anyhow::Result<()> {
    let phys = Leg::u1(Direction::In, [(-1, 1), (1, 1)])?;
    let ham: CompositeTensor<f64> =
        CompositeTensor::from_fn(
            vec![
                phys.clone(),
                phys.clone(),
                phys.reverse_direction(),
                phys.reverse_direction(),
            ],
            Charge::from(0),
            heisenberg,
        )?;
    println!("hamiltonian: {} of {} blocks allowed", ham.num_blocks(), 2_usize.pow(4));

    let amp = 0.5_f64.sqrt();
    for (name, sign) in [("singlet", -1.0), ("triplet", 1.0)] {
        let mut psi: CompositeTensor<f64> =
            CompositeTensor::zeros(vec![phys.clone(), phys.clone()], Charge::from(0))?;
        psi.set(&[1, 0], amp)?;
        psi.set(&[0, 1], sign * amp)?;
        let h_psi = ham.contract(&psi, &[(2, 0), (3, 1)])?;
        let energy = psi.conj()?.contract(&h_psi, &[(0, 0), (1, 1)])?.at(&[])?;
        println!("{name}: <H> = {energy:+.3} (norm {:.3})", psi.norm());
    }

    Ok(())
}
