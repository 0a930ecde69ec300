use super::*;
use quickcheck::{Arbitrary, Gen};

/// A random acyclic graph shape. Action `i` may only consume outputs of actions `j < i`, so every
/// generated shape is a valid DAG.
///
#[derive(Clone, Debug)]
pub(crate) struct RandomDag {
    pub(crate) prerequisites: Vec<Vec<usize>>,
}

impl RandomDag {
    pub(crate) fn len(&self) -> usize {
        self.prerequisites.len()
    }

    /// Build a graph where every action reads its own source file plus the outputs of its
    /// prerequisites, and writes `out/<i>.txt`.
    pub(crate) fn graph(&self) -> ActionGraph {
        let mut g = ActionGraph::builder();
        let outputs: Vec<ArtifactId> = (0..self.len())
            .map(|i| g.output(format!("out/{i}.txt")))
            .collect();

        for (i, prereqs) in self.prerequisites.iter().enumerate() {
            let mut inputs = vec![g.source(format!("src/{i}.txt"))];
            inputs.extend(prereqs.iter().map(|j| outputs[*j]));
            g.add_action(
                Action::builder()
                    .owner(format!("//random:{i}"))
                    .inputs(inputs)
                    .outputs(vec![outputs[i]])
                    .command(CommandSpec::shell("true"))
                    .build()
                    .unwrap(),
            );
        }

        g.build().unwrap()
    }
}

impl Arbitrary for RandomDag {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = usize::arbitrary(g) % 16 + 1;
        let prerequisites = (0..len)
            .map(|i| {
                (0..i)
                    .filter(|_| u8::arbitrary(g) % 4 == 0)
                    .collect::<Vec<usize>>()
            })
            .collect();
        Self { prerequisites }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut shorter = self.prerequisites.clone();
        if shorter.len() <= 1 {
            return quickcheck::empty_shrinker();
        }
        shorter.pop();
        quickcheck::single_shrinker(Self {
            prerequisites: shorter,
        })
    }
}
