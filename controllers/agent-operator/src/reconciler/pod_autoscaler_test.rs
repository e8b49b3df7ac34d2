//! Unit tests for the PodAutoscaler reconciler

#[cfg(test)]
mod tests {
    use crate::autoscaling::horizontal::{REASON_DISABLED, REASON_MAX};
    use crate::conditions::{find_condition, is_true};
    use crate::config::ControllerConfig;
    use crate::reconciler::Reconciler;
    use crate::reconciler::pod_autoscaler::rolled_out_version;
    use crate::recommender::{Recommendation, RecommendationError, RecommendationProvider};
    use crate::test_utils::*;
    use chrono::Duration;
    use cluster_client::{MockClusterClient, Operation};
    use crds::{
        ApplyMode, ConditionStatus, ConditionType, ContainerConstraints, ContainerResourceConstraints, Constraints,
        HorizontalStatus, HorizontalTargetStatus, PodAutoscaler, PodAutoscalerStatus, ResourceList, ScalingPolicy,
        ScalingRule, ScalingRuleType, ScalingStrategy, UpdateStrategy, ValueSource, VerticalActionType,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    const NS: &str = "default";

    struct UnavailableProvider;

    #[async_trait::async_trait]
    impl RecommendationProvider for UnavailableProvider {
        async fn fetch(&self, _namespace: &str, _name: &str) -> Result<Option<Recommendation>, RecommendationError> {
            Err(RecommendationError::Status {
                status: 503,
                body: "upstream down".to_string(),
            })
        }
    }

    fn percent_up_policy(autoscaler: &mut PodAutoscaler, min: i32, max: i32) {
        autoscaler.spec.constraints = Some(Constraints {
            min_replicas: Some(min),
            max_replicas: max,
            containers: vec![],
        });
        autoscaler.spec.apply_policy.scale_up = Some(ScalingPolicy {
            strategy: Some(ScalingStrategy::Max),
            rules: vec![ScalingRule {
                r#type: ScalingRuleType::Percent,
                value: 50,
                period_seconds: 60,
            }],
            stabilization_window_seconds: 0,
        });
    }

    fn cpu_bounds(name: &str, max: &str) -> ContainerConstraints {
        ContainerConstraints {
            name: name.to_string(),
            enabled: None,
            requests: Some(ContainerResourceConstraints {
                min_allowed: ResourceList::new(),
                max_allowed: ResourceList::from([("cpu".to_string(), max.to_string())]),
            }),
        }
    }

    fn replicas(mock: &MockClusterClient, name: &str) -> Option<i32> {
        mock.deployment(NS, name)?.spec?.replicas
    }

    #[tokio::test]
    async fn test_invalid_spec_deactivates_without_touching_target() {
        let (reconciler, mock, _) = create_test_reconciler();
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        autoscaler.spec.constraints = Some(Constraints {
            min_replicas: Some(5),
            max_replicas: 3,
            containers: vec![],
        });

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(mock.call_count(Operation::GetDeployment), 0);
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let active = find_condition(&status.conditions, ConditionType::Active).unwrap();
        assert_eq!(active.status, ConditionStatus::False);
        assert_eq!(active.reason, "InvalidSpec");
        assert!(active.message.contains("maxReplicas (3) must be >= minReplicas (5)"));
        let recommend = find_condition(&status.conditions, ConditionType::HorizontalAbleToRecommend).unwrap();
        assert_eq!(recommend.status, ConditionStatus::False);
    }

    #[tokio::test]
    async fn test_missing_target_raises_error_condition() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        let autoscaler = create_test_pod_autoscaler("web", NS, "web");
        recommendations.insert(NS, "web", horizontal_recommendation(4, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert!(is_true(&status.conditions, ConditionType::Error));
        let active = find_condition(&status.conditions, ConditionType::Active).unwrap();
        assert_eq!(active.status, ConditionStatus::False);
        assert_eq!(mock.call_count(Operation::ScaleDeployment), 0);
    }

    #[tokio::test]
    async fn test_error_condition_clears_when_target_appears() {
        let (reconciler, mock, _) = create_test_reconciler();
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();
        autoscaler.status = mock.pod_autoscaler_status(NS, "web");

        mock.add_deployment(NS, create_test_deployment("web", 3));
        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let error = find_condition(&status.conditions, ConditionType::Error).unwrap();
        assert_eq!(error.status, ConditionStatus::False);
        assert!(is_true(&status.conditions, ConditionType::Active));
        assert_eq!(status.current_replicas, Some(3));
    }

    #[tokio::test]
    async fn test_without_recommendation_only_observes() {
        let (reconciler, mock, _) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 3));
        let autoscaler = create_test_pod_autoscaler("web", NS, "web");

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert_eq!(status.current_replicas, Some(3));
        assert!(is_true(&status.conditions, ConditionType::Active));
        assert!(find_condition(&status.conditions, ConditionType::Error).is_none());
        assert!(status.horizontal.is_none());
    }

    #[tokio::test]
    async fn test_percent_rule_scales_within_bounds() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 5));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        percent_up_policy(&mut autoscaler, 2, 10);
        recommendations.insert(NS, "web", horizontal_recommendation(8, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(replicas(&mock, "web"), Some(8));
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert_eq!(status.current_replicas, Some(8));
        let horizontal = status.horizontal.unwrap();
        assert_eq!(horizontal.target.unwrap().replicas, 8);
        let action = &horizontal.last_actions[0];
        assert_eq!((action.from_replicas, action.to_replicas), (5, 8));
        assert_eq!(action.recommended_replicas, Some(8));
        assert_eq!(action.limited_reason, None);
        assert!(is_true(&status.conditions, ConditionType::HorizontalAbleToScale));
        assert!(find_condition(&status.conditions, ConditionType::HorizontalScalingLimited).is_none());
        assert_eq!(mock.events()[0].1.reason, "ScaledTarget");
    }

    #[tokio::test]
    async fn test_max_replicas_caps_and_keeps_rule_value() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 5));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        percent_up_policy(&mut autoscaler, 2, 6);
        recommendations.insert(NS, "web", horizontal_recommendation(8, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(replicas(&mock, "web"), Some(6));
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let action = &status.horizontal.as_ref().unwrap().last_actions[0];
        assert_eq!(action.to_replicas, 6);
        assert_eq!(action.recommended_replicas, Some(8));
        assert_eq!(action.limited_reason.as_deref(), Some(REASON_MAX));
        let limited = find_condition(&status.conditions, ConditionType::HorizontalScalingLimited).unwrap();
        assert_eq!(limited.status, ConditionStatus::True);
        assert_eq!(limited.message, REASON_MAX);
    }

    #[tokio::test]
    async fn test_rule_period_holds_following_pass() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 4));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        percent_up_policy(&mut autoscaler, 1, 100);
        recommendations.insert(NS, "web", horizontal_recommendation(20, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();
        assert_eq!(replicas(&mock, "web"), Some(6));
        autoscaler.status = mock.pod_autoscaler_status(NS, "web");

        // Within the rule period nothing moves
        reconciler
            .reconcile_pod_autoscaler_at(&autoscaler, t0() + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(replicas(&mock, "web"), Some(6));
        autoscaler.status = mock.pod_autoscaler_status(NS, "web");

        // Once elapsed the next step is allowed
        reconciler
            .reconcile_pod_autoscaler_at(&autoscaler, t0() + Duration::seconds(90))
            .await
            .unwrap();
        assert_eq!(replicas(&mock, "web"), Some(9));
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert_eq!(status.horizontal.unwrap().last_actions.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_direction_never_changes_replicas() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 5));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        autoscaler.spec.apply_policy.scale_up = Some(ScalingPolicy {
            strategy: Some(ScalingStrategy::Disabled),
            ..Default::default()
        });
        recommendations.insert(NS, "web", horizontal_recommendation(9, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(mock.call_count(Operation::ScaleDeployment), 0);
        assert_eq!(replicas(&mock, "web"), Some(5));
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert_eq!(status.horizontal.unwrap().target.unwrap().replicas, 5);
        let limited = find_condition(&status.conditions, ConditionType::HorizontalScalingLimited).unwrap();
        assert_eq!(limited.message, REASON_DISABLED);
    }

    #[tokio::test]
    async fn test_preview_records_without_scaling() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 5));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        autoscaler.spec.apply_policy.mode = ApplyMode::Preview;
        recommendations.insert(NS, "web", horizontal_recommendation(7, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(mock.call_count(Operation::ScaleDeployment), 0);
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let horizontal = status.horizontal.unwrap();
        assert_eq!(horizontal.target.unwrap().replicas, 7);
        assert!(horizontal.last_actions.is_empty());
        assert!(find_condition(&status.conditions, ConditionType::HorizontalAbleToScale).is_none());
    }

    #[tokio::test]
    async fn test_stale_recommendation_is_ignored() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 5));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        let recorded = HorizontalTargetStatus {
            source: ValueSource::Autoscaling,
            generated_at: Some(t0() + Duration::minutes(10)),
            replicas: 5,
        };
        autoscaler.status = Some(PodAutoscalerStatus {
            horizontal: Some(HorizontalStatus {
                target: Some(recorded.clone()),
                last_actions: vec![],
            }),
            ..Default::default()
        });
        recommendations.insert(NS, "web", horizontal_recommendation(9, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(mock.call_count(Operation::ScaleDeployment), 0);
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert_eq!(status.horizontal.unwrap().target, Some(recorded));
    }

    #[tokio::test]
    async fn test_scale_failure_is_reported() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 2));
        let autoscaler = create_test_pod_autoscaler("web", NS, "web");
        recommendations.insert(NS, "web", horizontal_recommendation(4, t0()));
        mock.fail_next(Operation::ScaleDeployment, 500, "etcd timeout");

        let err = reconciler
            .reconcile_pod_autoscaler_at(&autoscaler, t0())
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let scale = find_condition(&status.conditions, ConditionType::HorizontalAbleToScale).unwrap();
        assert_eq!(scale.status, ConditionStatus::False);
        assert_eq!(scale.reason, "ScaleFailed");
        assert!(status.horizontal.unwrap().last_actions.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_recommender_is_retried() {
        let mock = MockClusterClient::new();
        mock.add_deployment(NS, create_test_deployment("web", 2));
        let reconciler = Reconciler::new(mock.clone(), UnavailableProvider, ControllerConfig::default());
        let autoscaler = create_test_pod_autoscaler("web", NS, "web");

        let err = reconciler
            .reconcile_pod_autoscaler_at(&autoscaler, t0())
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        for condition in [ConditionType::HorizontalAbleToRecommend, ConditionType::VerticalAbleToRecommend] {
            let c = find_condition(&status.conditions, condition).unwrap();
            assert_eq!(c.status, ConditionStatus::False);
            assert!(c.message.contains("503"));
        }
    }

    #[tokio::test]
    async fn test_vertical_rollout_clamps_per_container() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 2));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        autoscaler.spec.constraints = Some(Constraints {
            min_replicas: None,
            max_replicas: 10,
            containers: vec![cpu_bounds("*", "2"), cpu_bounds("app", "4")],
        });
        recommendations.insert(
            NS,
            "web",
            vertical_recommendation(
                "v1",
                vec![
                    container_resources("app", "5", "256Mi"),
                    container_resources("sidecar", "3", "256Mi"),
                ],
            ),
        );

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        let live = mock.deployment(NS, "web").unwrap();
        assert_eq!(rolled_out_version(&live), Some("v1"));
        let pod = live.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let cpu = |i: usize| pod.containers[i].resources.as_ref().unwrap().requests.as_ref().unwrap()["cpu"].clone();
        assert_eq!(cpu(0), Quantity("4".to_string()));
        assert_eq!(cpu(1), Quantity("2".to_string()));

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let vertical = status.vertical.unwrap();
        let target = vertical.target.unwrap();
        assert_eq!(target.version, "v1");
        assert_eq!(target.pod_cpu_request, "6");
        assert_eq!(target.pod_memory_request, "512Mi");
        assert_eq!(vertical.last_action.unwrap().r#type, VerticalActionType::RolloutTriggered);
        assert!(is_true(&status.conditions, ConditionType::VerticalAbleToApply));

        // The same version is not rolled out twice; progress shows up as scaled pods
        autoscaler.status = mock.pod_autoscaler_status(NS, "web");
        mock.set_deployment_status(NS, "web", ready_status(2));
        mock.reset_calls();
        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();
        assert_eq!(mock.call_count(Operation::PatchDeploymentResources), 0);
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        assert_eq!(status.vertical.unwrap().target.unwrap().scaled, Some(2));
    }

    #[tokio::test]
    async fn test_vertical_rollout_skips_containers_missing_from_template() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 2));
        let autoscaler = create_test_pod_autoscaler("web", NS, "web");
        recommendations.insert(
            NS,
            "web",
            vertical_recommendation(
                "v1",
                vec![
                    container_resources("app", "1", "128Mi"),
                    container_resources("ghost", "1", "128Mi"),
                ],
            ),
        );

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        let live = mock.deployment(NS, "web").unwrap();
        assert_eq!(rolled_out_version(&live), Some("v1"));
        let pod = live.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let names: Vec<_> = pod.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["app", "sidecar"]);
        let app_cpu = pod.containers[0].resources.as_ref().unwrap().requests.as_ref().unwrap()["cpu"].clone();
        assert_eq!(app_cpu, Quantity("1".to_string()));

        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let target = status.vertical.unwrap().target.unwrap();
        let desired: Vec<_> = target.desired_resources.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(desired, vec!["app"]);
        assert!(is_true(&status.conditions, ConditionType::VerticalAbleToApply));
    }

    #[tokio::test]
    async fn test_vertical_update_disabled() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 2));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        autoscaler.spec.apply_policy.update.strategy = UpdateStrategy::Disabled;
        recommendations.insert(
            NS,
            "web",
            vertical_recommendation("v1", vec![container_resources("app", "1", "128Mi")]),
        );

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();

        assert_eq!(mock.call_count(Operation::PatchDeploymentResources), 0);
        let live = mock.deployment(NS, "web").unwrap();
        assert_eq!(rolled_out_version(&live), None);
        let status = mock.pod_autoscaler_status(NS, "web").unwrap();
        let apply = find_condition(&status.conditions, ConditionType::VerticalAbleToApply).unwrap();
        assert_eq!(apply.status, ConditionStatus::False);
        assert_eq!(status.vertical.unwrap().target.unwrap().version, "v1");
    }

    #[tokio::test]
    async fn test_unchanged_pass_skips_status_write() {
        let (reconciler, mock, recommendations) = create_test_reconciler();
        mock.add_deployment(NS, create_test_deployment("web", 5));
        let mut autoscaler = create_test_pod_autoscaler("web", NS, "web");
        percent_up_policy(&mut autoscaler, 2, 10);
        recommendations.insert(NS, "web", horizontal_recommendation(8, t0()));

        reconciler.reconcile_pod_autoscaler_at(&autoscaler, t0()).await.unwrap();
        autoscaler.status = mock.pod_autoscaler_status(NS, "web");
        mock.reset_calls();

        reconciler
            .reconcile_pod_autoscaler_at(&autoscaler, t0() + Duration::seconds(120))
            .await
            .unwrap();
        assert_eq!(mock.call_count(Operation::ScaleDeployment), 0);
        assert_eq!(mock.call_count(Operation::PatchPodAutoscalerStatus), 0);
    }
}
