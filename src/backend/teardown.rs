// Teardown sequencing
//
// Destruction order is a linear contract: strict reverse of construction.
// The plan is computed from whichever resources were actually built, so a
// construction failure at any step tears down exactly the prefix that
// exists, in the same order a full teardown would use.

/// Device-owned resources in destruction order. Image views are destroyed
/// by the swapchain wrapper immediately before the swapchain handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyStep {
    SyncObjects,
    CommandPool,
    Framebuffers,
    RenderPass,
    Pipeline,
    PipelineLayout,
    Swapchain,
}

/// Which device-owned resources exist. Field order mirrors construction
/// order in `App::init_vulkan`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltResources {
    pub swapchain: bool,
    pub render_pass: bool,
    pub pipeline_layout: bool,
    pub pipeline: bool,
    pub framebuffers: bool,
    pub command_pool: bool,
    pub sync_objects: bool,
}

pub fn teardown_plan(built: &BuiltResources) -> Vec<DestroyStep> {
    let full_order = [
        (built.sync_objects, DestroyStep::SyncObjects),
        (built.command_pool, DestroyStep::CommandPool),
        (built.framebuffers, DestroyStep::Framebuffers),
        (built.render_pass, DestroyStep::RenderPass),
        (built.pipeline, DestroyStep::Pipeline),
        (built.pipeline_layout, DestroyStep::PipelineLayout),
        (built.swapchain, DestroyStep::Swapchain),
    ];

    full_order
        .into_iter()
        .filter_map(|(exists, step)| exists.then_some(step))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Construction order as init_vulkan performs it. A fault at step N
    // leaves exactly the first N resources built.
    fn built_after(steps: usize) -> BuiltResources {
        let mut built = BuiltResources::default();
        let slots: [fn(&mut BuiltResources); 7] = [
            |b| b.swapchain = true,
            |b| b.render_pass = true,
            |b| b.pipeline_layout = true,
            |b| b.pipeline = true,
            |b| b.framebuffers = true,
            |b| b.command_pool = true,
            |b| b.sync_objects = true,
        ];
        for slot in slots.iter().take(steps) {
            slot(&mut built);
        }
        built
    }

    #[test]
    fn nothing_built_means_empty_plan() {
        assert!(teardown_plan(&built_after(0)).is_empty());
    }

    #[test]
    fn full_plan_is_reverse_of_construction() {
        assert_eq!(
            teardown_plan(&built_after(7)),
            vec![
                DestroyStep::SyncObjects,
                DestroyStep::CommandPool,
                DestroyStep::Framebuffers,
                DestroyStep::RenderPass,
                DestroyStep::Pipeline,
                DestroyStep::PipelineLayout,
                DestroyStep::Swapchain,
            ]
        );
    }

    #[test]
    fn each_fault_point_destroys_only_the_built_prefix() {
        let expected: [&[DestroyStep]; 7] = [
            &[DestroyStep::Swapchain],
            &[DestroyStep::RenderPass, DestroyStep::Swapchain],
            &[
                DestroyStep::RenderPass,
                DestroyStep::PipelineLayout,
                DestroyStep::Swapchain,
            ],
            &[
                DestroyStep::RenderPass,
                DestroyStep::Pipeline,
                DestroyStep::PipelineLayout,
                DestroyStep::Swapchain,
            ],
            &[
                DestroyStep::Framebuffers,
                DestroyStep::RenderPass,
                DestroyStep::Pipeline,
                DestroyStep::PipelineLayout,
                DestroyStep::Swapchain,
            ],
            &[
                DestroyStep::CommandPool,
                DestroyStep::Framebuffers,
                DestroyStep::RenderPass,
                DestroyStep::Pipeline,
                DestroyStep::PipelineLayout,
                DestroyStep::Swapchain,
            ],
            &[
                DestroyStep::SyncObjects,
                DestroyStep::CommandPool,
                DestroyStep::Framebuffers,
                DestroyStep::RenderPass,
                DestroyStep::Pipeline,
                DestroyStep::PipelineLayout,
                DestroyStep::Swapchain,
            ],
        ];

        for (faulted_after, want) in expected.iter().enumerate() {
            let plan = teardown_plan(&built_after(faulted_after + 1));
            assert_eq!(&plan.as_slice(), want, "prefix of {} steps", faulted_after + 1);
        }
    }
}
