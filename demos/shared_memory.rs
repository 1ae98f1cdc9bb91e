use kmeans1d::*;

fn main() {
    let (sample_cnt, k) = (2_000_000, 16);

    let mut rnd = generate::rng_from_seed(Some(1337));
    let data: generate::Dataset<f64> = generate::clustered(&mut rnd, sample_cnt, k);
    let kmean = KMeans::new(data.samples);

    for threads in [1, 2, 4, 8] {
        let conf = KMeansConfig::build().threads(threads).build();

        let started = std::time::Instant::now();
        let fork_join = kmean.kmeans_parallel(&data.initial_centroids, &conf).unwrap();
        let fork_join_time = started.elapsed();

        let started = std::time::Instant::now();
        let spmd = kmean.kmeans_spmd(&data.initial_centroids, &conf).unwrap();
        let spmd_time = started.elapsed();

        println!("{} threads: fork/join {:?} (SSE {:.3}, {} iterations) | spmd {:?} (SSE {:.3}, {} iterations)",
            threads, fork_join_time, fork_join.sse, fork_join.iterations, spmd_time, spmd.sse, spmd.iterations);
    }
}
