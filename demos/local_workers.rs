use kmeans1d::*;
use kmeans1d::comm::{Communicator, LocalCommunicator};

fn main() {
    let workers = 4;
    let mut rnd = generate::rng_from_seed(Some(7));
    let data: generate::Dataset<f64> = generate::clustered(&mut rnd, 1_000_003, 8);

    let conf = KMeansConfig::build()
        .iteration_done(&|nr, sse, _| println!("Iteration {} - Error: {:.2}", nr, sse))
        .build();

    let group = LocalCommunicator::new_group(workers);
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = group.iter().map(|comm| {
            let (data, conf) = (&data, &conf);
            s.spawn(move || {
                let input = comm.is_root().then(|| Ok((data.samples.clone(), data.initial_centroids.clone())));
                KMeans::kmeans_distributed(comm, input, conf)
            })
        }).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let state = results.into_iter().next().unwrap().unwrap().unwrap();
    println!("Centroids: {:?}", state.centroids);
    println!("Processed samples: {} of {}", state.assignments.len(), data.samples.len());
    println!("Error: {}", state.sse);
}
