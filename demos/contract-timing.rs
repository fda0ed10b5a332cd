use std::time::Instant;
use rand::{ thread_rng, Rng };
use symblock::{ Charge, CompositeTensor, ContractOptions, Direction, Leg };

const BOND_SECTORS: i64 = 6;
const DEGENERACY: usize = 24;

fn timeit<F, T>(mut f: F) -> (T, f64)
where F: FnMut() -> T
{
    let t0 = Instant::now();
    let out: T = f();
    (out, (Instant::now() - t0).as_secs_f64())
}

// Contract two random rank-3 tensors over a wide U(1) bond, once on the calling
// thread and once with result blocks spread over the rayon pool.
fn main() -> anyhow::Result<()> {
    let mut rng = thread_rng();
    let bond =
        Leg::u1(
            Direction::In,
            (-BOND_SECTORS..=BOND_SECTORS).map(|q| (q, DEGENERACY)),
        )?;
    let phys = Leg::u1(Direction::In, [(-1, 1), (1, 1)])?;

    let a: CompositeTensor<f64> =
        CompositeTensor::from_fn(
            vec![bond.clone(), phys.clone(), bond.reverse_direction()],
            Charge::from(0),
            |_| rng.gen::<f64>() - 0.5,
        )?;
    let b: CompositeTensor<f64> =
        CompositeTensor::from_fn(
            vec![bond.clone(), phys.clone(), bond.reverse_direction()],
            Charge::from(0),
            |_| rng.gen::<f64>() - 0.5,
        )?;
    println!("operand blocks: {} and {}", a.num_blocks(), b.num_blocks());

    print!("sequential ... ");
    let (seq, t) = timeit(|| a.contract(&b, &[(2, 0)]));
    let seq = seq?;
    println!("{:.3} secs", t);

    let opts = ContractOptions::default().with_parallel(true).with_min_parallel_blocks(2);
    print!("parallel ... ");
    let (par, t) = timeit(|| a.contract_with(&b, &[(2, 0)], &opts));
    let par = par?;
    println!("{:.3} secs", t);

    println!("result blocks: {}", seq.num_blocks());
    println!("results agree: {}", seq.approx_eq(&par, Some(1e-9)));

    Ok(())
}
